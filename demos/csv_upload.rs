use financial_kpi_engine::*;
use std::path::PathBuf;

const UPLOAD: &str = "\
period,revenue,cogs,opex,cash,current_assets,current_liabilities,accounts_receivable,debt,equity,customers,employees
Jan 2024,400000,120000,350000,2000000,2150000,400000,120000,250000,1500000,800,38
Feb 2024,430000,125000,355000,1930000,2080000,400000,125000,250000,1500000,860,38
Mar 2024,470000,132000,362000,1880000,2030000,410000,131000,250000,1500000,940,39
Apr 2024,515000,140000,370000,1850000,2000000,415000,138000,250000,1500000,1030,40
";

fn main() -> anyhow::Result<()> {
    // Point CSV_PATH at a file to analyse your own numbers.
    let bytes = match std::env::var("CSV_PATH") {
        Ok(path) => std::fs::read(&path)?,
        Err(_) => UPLOAD.as_bytes().to_vec(),
    };

    let store = InMemoryRunStore::new();
    store.replace_sample(compute_sample_run()?)?;

    let run = match compute_run_from_csv(&bytes, Some("Q1 Upload")) {
        Ok(run) => run,
        Err(e) if e.is_rejected_input() => {
            eprintln!("❌ Upload rejected: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let id = store.insert(run)?;
    println!("✅ Stored upload as {}\n", id);

    println!("Runs in store:");
    for summary in store.list()? {
        println!(
            "  {}  {:<28} {} period(s) {}..{}",
            summary.created_at.format("%H:%M:%S"),
            summary.name,
            summary.period_count,
            summary.first_period.as_deref().unwrap_or("-"),
            summary.last_period.as_deref().unwrap_or("-"),
        );
    }

    let run = store.get(id)?;
    let latest = run.kpis().last().map(|k| k.period.clone()).unwrap_or_default();

    if let Some(entries) = run.compare_with_prior(&latest)? {
        println!("\n{} vs prior month:", latest);
        for entry in entries {
            let change = entry
                .variance_percent
                .map_or_else(|| "N/A".to_string(), |pct| format!("{:+.1}%", pct));
            println!("  {:<24} {:>8}  {:?}", entry.label, change, entry.status);
        }
    }

    let out_dir = std::env::temp_dir();
    for format in [ExportFormat::Csv, ExportFormat::PrettyJson, ExportFormat::Markdown] {
        let path: PathBuf = out_dir.join(format!("kpi_upload.{}", format.extension()));
        export_run_to_file(&run, &path, format)?;
        println!("💾 Wrote {}", path.display());
    }

    Ok(())
}
