use std::io::{self, Write};

use anyhow::Result;
use clap::{Parser, Subcommand};

use procurement_assistant::config::{self, AppConfig};
use procurement_assistant::logging::{backend_error, backend_info, backend_warn, init_logging};
use procurement_assistant::{QueryResponse, QueryService, SessionId};

#[derive(Parser)]
#[command(name = "procurement-assistant", version)]
#[command(about = "Ask procurement questions in plain language; answered with SQL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question (non-interactive)
    Ask {
        question: String,
        /// Print the response object as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive session that keeps context between questions
    Chat,

    /// Show the table definitions the model is given
    Tables,
}

pub const EXAMPLE_QUESTIONS: &[&str] = &[
    "Show all orders over 100000",
    "Which purchase orders were created this month?",
    "Which orders may be delayed?",
    "What is the total PO value per buyer?",
    "Show the items for these POs",
];

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = dotenvy::dotenv();
    init_logging();
    match dotenv {
        Ok(path) => backend_info(format!("Loaded .env from: {}", path.display())),
        Err(e) => backend_warn(format!("No .env loaded: {}", e)),
    }

    let cli = Cli::parse();
    let cfg = config::load_config().unwrap_or_else(|e| {
        backend_warn(format!("Config load failed ({}), using defaults", e));
        config::default_config()
    });
    log_startup(&cfg);

    let service = QueryService::from_config(&cfg).map_err(|e| {
        backend_error(format!("Startup failed: {}", e));
        e
    })?;

    match cli.command {
        Command::Ask { question, json } => {
            let session = SessionId::new();
            let response = service.handle_query(&session, &question).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                print_response(&response);
            }
        }

        Command::Chat => chat(&service).await,

        Command::Tables => {
            let ddl = service.pipeline().table_info().await?;
            println!("{}", ddl);
        }
    }
    Ok(())
}

/// Interactive loop; one session for the whole run.
async fn chat(service: &QueryService) {
    let session = SessionId::new();

    println!();
    println!("╔════════════════════════════════════════════════════╗");
    println!("║   Procurement Assistant                            ║");
    println!("╠════════════════════════════════════════════════════╣");
    println!("║  'clear' resets context, 'exit' or Ctrl+C quits.   ║");
    println!("╠════════════════════════════════════════════════════╣");
    println!("  Examples:");
    for q in EXAMPLE_QUESTIONS {
        println!("    • {}", q);
    }
    println!("╚════════════════════════════════════════════════════╝");
    println!();

    loop {
        print!("❯ ");
        io::stdout().flush().ok();

        let mut input = String::new();
        match io::stdin().read_line(&mut input) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let question = input.trim();

        if question.is_empty() { continue; }
        if question.eq_ignore_ascii_case("exit")
            || question.eq_ignore_ascii_case("quit")
            || question == "q" { break; }
        if question.eq_ignore_ascii_case("clear") {
            println!("{}", service.clear_history(&session).message);
            continue;
        }

        let response = service.handle_query(&session, question).await;
        print_response(&response);
        println!();
    }
}

fn print_response(response: &QueryResponse) {
    if let Some(err) = &response.error {
        println!("Error: {}", err);
        return;
    }
    if let Some(sql) = &response.sql {
        println!();
        println!("SQL: {}", sql);
    }
    println!();
    match &response.result {
        Some(narrative) => println!("{}", narrative),
        None => println!("(no summary)"),
    }
    println!();
    println!("{}", response.rows.render_table(50));
}

fn log_startup(cfg: &AppConfig) {
    let key = cfg.llm.openrouter_api_key.as_deref().unwrap_or("");
    if key.is_empty() {
        backend_warn("OPENROUTER_API_KEY not set");
    } else {
        backend_info(format!("OPENROUTER_API_KEY loaded (length: {})", key.len()));
    }
    backend_info(format!(
        "Database {} attached as '{}' ({} visible tables), model {}",
        cfg.database.path,
        cfg.database.schema,
        cfg.database.included_tables.len(),
        cfg.llm.model
    ));
}
