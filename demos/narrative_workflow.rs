use dotenv::dotenv;
use financial_kpi_engine::llm::NarrativeClient;
use financial_kpi_engine::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let api_key = std::env::var("GEMINI_API_KEY")
        .map_err(|_| anyhow::anyhow!("GEMINI_API_KEY must be set"))?;

    let config = match std::env::var("KPI_ENGINE_CONFIG") {
        Ok(path) => EngineConfig::from_path(path)?,
        Err(_) => EngineConfig::default(),
    };
    let narrative_config = config.narrative.clone().with_api_key(api_key);

    let client = NarrativeClient::new(&narrative_config)?;
    println!("🤖 Using model {}\n", client.model());

    let store = InMemoryRunStore::new();
    let run = RunAggregator::new(config)?.build_sample()?;
    let id = store.replace_sample(run)?;
    let run = store.get(id)?;

    let question = std::env::args().nth(1);
    for focus in [NarrativeFocus::ExecutiveSummary, NarrativeFocus::Forecast] {
        println!("Generating {} narrative...", focus.as_str());
        let block =
            generate_narrative(&client, &run.narrative_context(), focus, question.as_deref())
                .await?;
        println!("\n{}\n", block.response.summary);
        for risk in &block.response.risks {
            println!("  ⚠️  {}", risk);
        }
        for rec in &block.response.recommendations {
            println!("  ➡️  {}", rec);
        }
        println!();
        store.append_narrative(id, block)?;
    }

    let run = store.get(id)?;
    println!("{}", run_to_markdown(&run));
    Ok(())
}
