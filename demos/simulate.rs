use shrinkage_models::{ColumnData, SimulationConfig, simulate_seeded, standardize_dataset};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seed = match std::env::args().nth(1) {
        Some(text) => text.parse()?,
        None => 404,
    };
    let config = SimulationConfig::default();
    let data = simulate_seeded(&config, 200, seed)?;
    let (standardized, transforms) = standardize_dataset(&data, &config.outcome.name)?;

    println!("Simulated {} rows (seed {seed})", data.n_rows());
    println!("Causal predictors: {}", config.causal_predictors().join(", "));
    for (name, transform) in &transforms {
        println!(
            "  {name:<16} mean={:>9.3} sd={:>8.3}",
            transform.mean, transform.sd
        );
    }
    for column in standardized.columns() {
        if let ColumnData::Categorical { levels, codes } = &column.data {
            let counts = levels
                .iter()
                .enumerate()
                .map(|(code, level)| {
                    let count = codes.iter().filter(|&&c| c == code).count();
                    format!("{level}={count}")
                })
                .collect::<Vec<_>>();
            println!("  {:<18} {}", column.name, counts.join(" "));
        }
    }
    Ok(())
}
