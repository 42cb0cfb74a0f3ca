//! Server-rendered HTML pages for the upload interface

use crate::error::ScoreError;
use crate::export::{TableView, EXPORT_CONTENT_TYPE, EXPORT_FILE_NAME};
use crate::scoring::ScoreReport;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fmt::Write;

const STYLE: &str = "body{font-family:sans-serif;margin:2rem;max-width:80rem}\
table{border-collapse:collapse;margin-bottom:1.5rem}\
th,td{border:1px solid #ccc;padding:.25rem .5rem;text-align:left}\
th{background:#f3f3f3}.error{color:#a00}.muted{color:#666}";

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
         <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
         <h1>Retail Stockout Risk Prediction</h1>\n{body}</body>\n</html>\n",
        title = escape(title),
    )
}

/// Upload form. Both buttons post the same file: one renders the results,
/// the other returns the predictions file.
fn upload_form() -> &'static str {
    "<form method=\"post\" action=\"/score\" enctype=\"multipart/form-data\">\n\
     <p><label>Upload inventory CSV <input type=\"file\" name=\"file\" accept=\".csv,text/csv\" required></label></p>\n\
     <p><button type=\"submit\">Score</button>\n\
     <button type=\"submit\" formaction=\"/predictions.csv\">Download predictions</button></p>\n\
     </form>\n"
}

pub fn index_page() -> String {
    let body = format!(
        "<p>Upload a CSV file with raw input data (same format as training).</p>\n{}\
         <p class=\"muted\">Please upload a file to begin.</p>\n",
        upload_form()
    );
    page("Retail Stockout Risk Scoring", &body)
}

pub fn results_page(report: &ScoreReport, file_name: Option<&str>) -> String {
    let mut body = String::new();

    if let Some(name) = file_name {
        let _ = writeln!(body, "<p>Scored <strong>{}</strong>.</p>", escape(name));
    }
    let _ = writeln!(
        body,
        "<p>{} rows scored. Mean stockout risk: {}. Total economic impact: {:.2}.</p>",
        report.rows(),
        report
            .mean_stockout_risk()
            .map(|m| format!("{:.4}", m))
            .unwrap_or_else(|| "n/a".to_string()),
        report.total_economic_impact()
    );

    body.push_str("<h2>Sample Preview</h2>\n");
    body.push_str(&table(&report.preview));
    body.push_str("<h2>Predictions &amp; Business Impact</h2>\n");
    body.push_str(&table(&report.results));
    body.push_str("<h2>Download Full Predictions</h2>\n");
    body.push_str(&download_link(&report.csv));
    body.push_str("<h2>Score Another File</h2>\n");
    body.push_str(upload_form());

    page("Stockout Risk Predictions", &body)
}

/// Link carrying the export inline, so the download needs no second upload
fn download_link(csv: &[u8]) -> String {
    format!(
        "<p><a download=\"{name}\" href=\"data:{mime};base64,{data}\">Download {name}</a></p>\n",
        name = EXPORT_FILE_NAME,
        mime = EXPORT_CONTENT_TYPE,
        data = STANDARD.encode(csv),
    )
}

pub fn error_page(err: &ScoreError) -> String {
    let body = format!(
        "<p class=\"error\"><strong>The upload could not be scored.</strong> {}</p>\n\
         <p>Fix the file and upload it again.</p>\n{}",
        escape(&err.to_string()),
        upload_form()
    );
    page("Upload rejected", &body)
}

fn table(view: &TableView) -> String {
    let mut html = String::from("<table>\n<thead><tr>");
    for name in &view.header {
        let _ = write!(html, "<th>{}</th>", escape(name));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in &view.rows {
        html.push_str("<tr>");
        for cell in row {
            let _ = write!(html, "<td>{}</td>", escape(cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n");
    html
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"A&B\"</b>"), "&lt;b&gt;&quot;A&amp;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn test_table_rendering_escapes_cells() {
        let view = TableView {
            header: vec!["store_id".to_string()],
            rows: vec![vec!["<S1>".to_string()]],
        };
        let html = table(&view);
        assert!(html.contains("<th>store_id</th>"));
        assert!(html.contains("<td>&lt;S1&gt;</td>"));
    }

    #[test]
    fn test_download_link_embeds_export() {
        let html = download_link(b"store_id,stockout_risk\nS1,0.5\n");
        assert!(html.contains("download=\"predictions.csv\""));

        let encoded = html
            .split("base64,")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert_eq!(
            STANDARD.decode(encoded).unwrap(),
            b"store_id,stockout_risk\nS1,0.5\n"
        );
    }

    #[test]
    fn test_error_page_keeps_form() {
        let html = error_page(&ScoreError::Parse("bad quote".to_string()));
        assert!(html.contains("bad quote"));
        assert!(html.contains("action=\"/score\""));
    }
}
