use shrinkage_models::{StudyConfig, run_study};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = StudyConfig {
        cache_dir: Some("target/shrinkage-cache".into()),
        ..StudyConfig::default()
    };
    if let Some(seed) = std::env::args().nth(1) {
        config.data_seed = seed.parse()?;
    }

    let report = run_study(&config)?;
    print!("{}", report.render());

    println!("Slope shrinkage (posterior means):");
    for row in report.shrinkage() {
        let causal = report
            .causal_predictors
            .iter()
            .any(|name| row.name.starts_with(name.as_str()));
        println!(
            "  {:<28} naive={:>9.3}  horseshoe={:>9.3}  {}{}",
            row.name,
            row.naive.mean,
            row.horseshoe.mean,
            if row.is_shrunk() { "shrunk" } else { "      " },
            if causal { "  (causal)" } else { "" }
        );
    }
    Ok(())
}
