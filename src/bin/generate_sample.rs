use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate};
use clap::Parser;

/// Write synthetic superstore and mortality files matching the bundled
/// dataset layouts.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Output directory
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Number of superstore order lines
    #[arg(long, default_value_t = 2000)]
    orders: usize,
    /// Number of monthly snapshots per department
    #[arg(long, default_value_t = 24)]
    months: u32,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn below(&mut self, n: usize) -> usize {
        (self.next_f64() * n as f64) as usize % n.max(1)
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[self.below(items.len())]
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

// ---------------------------------------------------------------------------
// Superstore orders
// ---------------------------------------------------------------------------

const LOCATIONS: [(&str, &str, &str); 8] = [
    ("South", "Kentucky", "Henderson"),
    ("South", "Florida", "Fort Lauderdale"),
    ("West", "California", "Los Angeles"),
    ("West", "Washington", "Seattle"),
    ("East", "New York", "New York City"),
    ("East", "Pennsylvania", "Philadelphia"),
    ("Central", "Texas", "Houston"),
    ("Central", "Illinois", "Chicago"),
];

const PRODUCTS: [(&str, &str, f64); 9] = [
    ("Furniture", "Bookcases", 260.0),
    ("Furniture", "Chairs", 240.0),
    ("Furniture", "Tables", 320.0),
    ("Office Supplies", "Binders", 20.0),
    ("Office Supplies", "Paper", 15.0),
    ("Office Supplies", "Storage", 110.0),
    ("Technology", "Phones", 180.0),
    ("Technology", "Accessories", 75.0),
    ("Technology", "Machines", 600.0),
];

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn write_superstore(path: &Path, orders: usize, rng: &mut SimpleRng) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "Order Date", "Region", "State", "City", "Category", "Sub-Category", "Sales", "Quantity",
        "Profit",
    ])?;

    let first_day = NaiveDate::from_ymd_opt(2014, 1, 3).context("invalid start date")?;
    for _ in 0..orders {
        let date = first_day + chrono::Duration::days(rng.below(4 * 365) as i64);
        let (region, state, city) = *rng.pick(&LOCATIONS);
        let (category, sub_category, unit_price) = *rng.pick(&PRODUCTS);
        let quantity = 1 + rng.below(9);
        let sales = round_to(
            unit_price * quantity as f64 * rng.gauss(1.0, 0.15).max(0.3),
            2,
        );
        let margin = rng.gauss(0.12, 0.2);
        let profit = round_to(sales * margin, 4);

        writer.write_record([
            format!("{}/{}/{}", date.month(), date.day(), date.year()),
            region.to_string(),
            state.to_string(),
            city.to_string(),
            category.to_string(),
            sub_category.to_string(),
            sales.to_string(),
            quantity.to_string(),
            profit.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Mortality by department
// ---------------------------------------------------------------------------

const DEPARTMENTS: [(&str, u64); 12] = [
    ("Ain", 657_856),
    ("Aisne", 531_345),
    ("Bouches-du-Rhône", 2_043_110),
    ("Côte-d'Or", 534_124),
    ("Finistère", 915_090),
    ("Haute-Garonne", 1_400_039),
    ("Hérault", 1_175_623),
    ("Lozère", 76_601),
    ("Nord", 2_608_346),
    ("Paris", 2_165_423),
    ("Réunion", 868_846),
    ("Rhône", 1_876_051),
];

/// Share of deaths per age bracket, youngest first.
const BRACKET_SHARES: [f64; 6] = [0.012, 0.035, 0.12, 0.16, 0.27, 0.403];

fn write_mortality(path: &Path, months: u32, rng: &mut SimpleRng) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    writer.write_record([
        "Département", "Date", "Décès", "Population", "0-24 ans", "25-44 ans", "45-64 ans",
        "65-74 ans", "75-84 ans", "85 ans et +",
    ])?;

    let first_month = NaiveDate::from_ymd_opt(2020, 1, 1).context("invalid start date")?;
    for month in 0..months {
        let date = first_month
            .checked_add_months(Months::new(month))
            .context("date out of range")?;
        // Winter peak.
        let season = 1.0 + 0.15 * (2.0 * std::f64::consts::PI * date.month0() as f64 / 12.0).cos();
        for (name, population) in DEPARTMENTS {
            let expected = population as f64 * 0.0008 * season;
            let mut brackets: Vec<u64> = BRACKET_SHARES
                .iter()
                .map(|share| {
                    let mean = expected * share;
                    rng.gauss(mean, mean.sqrt()).round().max(0.0) as u64
                })
                .collect();
            if brackets[0] == 0 {
                brackets[0] = 1;
            }
            // Deaths are the sum of the brackets.
            let deaths: u64 = brackets.iter().sum();

            let mut record = vec![
                name.to_string(),
                date.to_string(),
                deaths.to_string(),
                population.to_string(),
            ];
            record.extend(brackets.iter().map(u64::to_string));
            writer.write_record(&record)?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let superstore = args.out_dir.join("superstore_sample.csv");
    write_superstore(&superstore, args.orders, &mut rng)?;
    println!("Wrote {} order lines to {}", args.orders, superstore.display());

    let mortality = args.out_dir.join("mortalite_sample.csv");
    write_mortality(&mortality, args.months, &mut rng)?;
    println!(
        "Wrote {} department snapshots to {}",
        args.months as usize * DEPARTMENTS.len(),
        mortality.display()
    );
    Ok(())
}
