//! Themix — gene list enrichment and LLM theming.
//! Entry point for the agent binary.

use tracing::info;
use tracing_subscriber::EnvFilter;

use themix_agent::{AnalysisRequest, Config, EnrichmentAgent};

struct CliArgs {
    genes: Vec<String>,
    email: String,
    context: String,
    search_terms: Vec<String>,
    name: Option<String>,
    ranked: bool,
    save: bool,
}

fn usage() -> ! {
    eprintln!(
        "Usage: themix --email ADDRESS [OPTIONS] GENE [GENE...]\n\
         \n\
         Options:\n\
           --email ADDRESS    Contact email for NCBI E-utilities (required)\n\
           --context TEXT     Experimental context passed to the model\n\
           --term TERM        MeSH term for the literature search (repeatable)\n\
           --name NAME        Name for the results directory\n\
           --not-ranked       Treat the gene list as unordered\n\
           --no-save          Skip writing result files"
    );
    std::process::exit(2);
}

fn parse_args() -> CliArgs {
    let mut args = CliArgs {
        genes: Vec::new(),
        email: String::new(),
        context: String::new(),
        search_terms: Vec::new(),
        name: None,
        ranked: true,
        save: true,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--email" => args.email = iter.next().unwrap_or_else(|| usage()),
            "--context" => args.context = iter.next().unwrap_or_else(|| usage()),
            "--term" => args.search_terms.push(iter.next().unwrap_or_else(|| usage())),
            "--name" => args.name = Some(iter.next().unwrap_or_else(|| usage())),
            "--not-ranked" => args.ranked = false,
            "--no-save" => args.save = false,
            "--help" | "-h" => usage(),
            other if other.starts_with("--") => usage(),
            gene => args.genes.push(gene.to_string()),
        }
    }

    if args.genes.is_empty() || args.email.is_empty() {
        usage();
    }
    args
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("themix=debug,info")),
        )
        .init();

    let cli = parse_args();

    let config = match Config::load() {
        Ok(c) => {
            info!(model = %c.llm.model, results_dir = %c.results_dir, "Configuration loaded");
            c
        }
        Err(e) => {
            tracing::warn!("Could not load themix.toml: {e}");
            tracing::warn!("Falling back to defaults (THEMIX_OPENAI_API_KEY must be set).");
            Config::default()
        }
    };

    let agent = EnrichmentAgent::new(config)?;

    let mut request = AnalysisRequest::new(cli.genes, cli.email);
    request.context = cli.context;
    request.search_terms = cli.search_terms;
    request.analysis_name = cli.name;
    request.ranked = cli.ranked;
    request.save_results = cli.save;

    let result = agent.run_analysis(request).await?;

    println!("\n{}\n", result.summary);
    for theme in &result.themes {
        println!("## {}", theme.name);
        println!("{}", theme.description);
        if !theme.term_ids.is_empty() {
            println!("terms: {}", theme.term_ids.join(", "));
        }
        if !theme.paper_ids.is_empty() {
            println!("papers: {}", theme.paper_ids.join(", "));
        }
        println!();
    }

    Ok(())
}
