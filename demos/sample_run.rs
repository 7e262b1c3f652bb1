use financial_kpi_engine::*;

fn main() -> anyhow::Result<()> {
    println!("📊 Building the sample analysis run...\n");

    let run = compute_sample_run()?;
    println!(
        "✅ {} ({} periods, id {})\n",
        run.name,
        run.periods().len(),
        run.id
    );

    println!("Key performance indicators:");
    for set in run.kpis() {
        println!(
            "  {}  revenue {:>12}  gross margin {:>7}  MoM {:>7}  ARPU {:>8}",
            set.period,
            Metric::Revenue.kind().format(Some(set.revenue)),
            Metric::GrossMargin.kind().format(set.gross_margin),
            Metric::MomGrowth.kind().format(set.mom_growth),
            Metric::Arpu.kind().format(set.arpu),
        );
    }

    println!("\nLatest period against the prior month:");
    for entry in run.latest_variance() {
        println!(
            "  {:<24} {:?}  {}",
            entry.label, entry.status, entry.driver_explanation
        );
    }

    println!("\nScenario outlook:");
    for scenario in Scenario::ALL {
        let forecast = run.generate_forecast(scenario);
        if let Some(last) = forecast.periods.last() {
            println!(
                "  {:<9} {:+.2}%/month -> {} revenue {}",
                scenario.to_string(),
                forecast.monthly_growth_rate * 100.0,
                last.period,
                Metric::Revenue.kind().format(Some(last.revenue)),
            );
        }
    }

    println!("\n{}", export_run(&run, ExportFormat::Markdown)?);
    Ok(())
}
