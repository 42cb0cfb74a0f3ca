//! Sample Inventory Generator
//!
//! Writes synthetic inventory rows in the upload format, for trying the
//! scoring interface without real data.
//!
//! Usage: sample_inventory [count] [tight_rate] [output.csv]

use anyhow::Context;
use chrono::{Duration, NaiveDate};
use rand::Rng;
use std::io::Write;
use stockout_risk_scoring::normalizer::COLUMN_RENAMES;
use tracing::info;

/// Inventory row generator
struct InventoryGenerator {
    rng: rand::rngs::ThreadRng,
    start: NaiveDate,
    day: i64,
}

impl InventoryGenerator {
    fn new(start: NaiveDate) -> Self {
        Self {
            rng: rand::thread_rng(),
            start,
            day: 0,
        }
    }

    /// Generate a row with comfortable stock
    fn generate_stocked(&mut self) -> Vec<String> {
        let demand: f64 = self.rng.gen_range(20.0..150.0);
        let inventory = self.rng.gen_range(150..500);
        self.row(inventory, demand)
    }

    /// Generate a row whose inventory barely covers the forecast
    fn generate_tight(&mut self) -> Vec<String> {
        let demand: f64 = self.rng.gen_range(100.0..300.0);
        let inventory = self.rng.gen_range(0..(demand as i64 / 2).max(1));
        self.row(inventory, demand)
    }

    fn row(&mut self, inventory: i64, demand: f64) -> Vec<String> {
        self.day += 1;
        let date = self.start + Duration::days(self.day % 365);
        let price: f64 = self.rng.gen_range(5.0..100.0);
        let units_sold = self.rng.gen_range(0..=(inventory.max(1)));
        let competitor = price * self.rng.gen_range(0.9..1.1);

        vec![
            date.format("%Y-%m-%d").to_string(),
            format!("S{:03}", self.rng.gen_range(1..6)),
            format!("P{:04}", self.rng.gen_range(1..21)),
            self.random_choice(&["Groceries", "Toys", "Electronics", "Furniture", "Clothing"])
                .to_string(),
            self.random_choice(&["North", "South", "East", "West"]).to_string(),
            inventory.to_string(),
            units_sold.to_string(),
            self.rng.gen_range(20..200).to_string(),
            format!("{:.2}", demand),
            format!("{:.2}", price),
            self.random_choice(&["0", "5", "10", "15", "20"]).to_string(),
            self.random_choice(&["Sunny", "Rainy", "Cloudy", "Snowy"]).to_string(),
            if self.rng.gen_bool(0.3) { "1" } else { "0" }.to_string(),
            format!("{:.2}", competitor),
            self.random_choice(&["Winter", "Spring", "Summer", "Autumn"]).to_string(),
        ]
    }

    fn random_choice<'a>(&mut self, choices: &[&'a str]) -> &'a str {
        choices[self.rng.gen_range(0..choices.len())]
    }
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays a clean CSV
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sample_inventory=info".parse()?),
        )
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(20);
    let tight_rate: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(0.2);
    let output = args.get(3);

    info!(count = count, tight_rate = tight_rate, output = ?output, "Generating sample inventory");

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            std::fs::File::create(path).with_context(|| format!("Failed to create {}", path))?,
        ),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(COLUMN_RENAMES.iter().map(|(header, _)| *header))?;

    let start = NaiveDate::from_ymd_opt(2024, 1, 1).context("Invalid start date")?;
    let mut generator = InventoryGenerator::new(start);
    let mut rng = rand::thread_rng();
    let mut tight_count = 0;

    for _ in 0..count {
        let row = if rng.gen_bool(tight_rate.clamp(0.0, 1.0)) {
            tight_count += 1;
            generator.generate_tight()
        } else {
            generator.generate_stocked()
        };
        writer.write_record(&row)?;
    }
    writer.flush()?;

    info!(
        "Completed! Wrote {} rows ({} tight, {} stocked)",
        count,
        tight_count,
        count - tight_count
    );

    Ok(())
}
