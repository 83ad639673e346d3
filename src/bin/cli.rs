use clap::{Parser, Subcommand};
use mi6::{
    db,
    models::{CreateAgentRequest, NewAgentPath},
    repositories::SqliteAgentRepository,
    services::AgentService,
};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mi6-cli")]
#[command(about = "CLI tool for managing MI6 mock agents", long_about = None)]
struct Cli {
    /// SQLite database holding agents and their paths
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://agents.db", global = true)]
    database_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Agent management commands
    Agent {
        #[command(subcommand)]
        command: AgentCommands,
    },
}

#[derive(Subcommand)]
enum AgentCommands {
    /// Create a new agent
    Create {
        /// Unique agent name
        #[arg(short, long)]
        name: String,

        /// Port the agent listens on when started
        #[arg(short, long)]
        port: String,

        /// Canned response as PATH=BODY, repeatable
        #[arg(long = "path", value_parser = parse_path_spec)]
        paths: Vec<NewAgentPath>,
    },

    /// List all agents
    List,

    /// Show an agent and its configured paths
    Show {
        /// Agent ID
        #[arg(short, long)]
        id: i64,
    },
}

/// Splits `PATH=BODY` at the first `=`, so bodies may contain `=`.
fn parse_path_spec(spec: &str) -> Result<NewAgentPath, String> {
    match spec.split_once('=') {
        Some((path, response)) if !path.is_empty() => Ok(NewAgentPath::new(path, response)),
        _ => Err(format!("expected PATH=BODY, got '{}'", spec)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Connect to database
    let pool = db::create_pool(&cli.database_url).await?;

    // Run migrations
    db::run_migrations(&pool).await?;

    let agent_repository = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let agent_service = AgentService::new(agent_repository);

    match cli.command {
        Commands::Agent { command } => match command {
            AgentCommands::Create { name, port, paths } => {
                let request = CreateAgentRequest { name, port, paths };

                match agent_service.create_agent(request).await {
                    Ok(id) => {
                        println!("✅ Agent created successfully!");
                        println!("  ID: {}", id);
                    }
                    Err(err) => {
                        eprintln!("❌ Failed to create agent: {}", err);
                        std::process::exit(1);
                    }
                }
            }

            AgentCommands::List => match agent_service.list_agents().await {
                Ok(agents) => {
                    if agents.is_empty() {
                        println!("No agents found.");
                    } else {
                        println!(
                            "{:<5} {:<30} {:<8} {:<10} {:<20}",
                            "ID", "Name", "Port", "Status", "Created"
                        );
                        println!("{}", "-".repeat(75));
                        for agent in agents {
                            println!(
                                "{:<5} {:<30} {:<8} {:<10} {:<20}",
                                agent.id,
                                agent.name,
                                agent.port,
                                agent.status,
                                agent.created_at_display()
                            );
                        }
                    }
                }
                Err(err) => {
                    eprintln!("❌ Failed to list agents: {}", err);
                    std::process::exit(1);
                }
            },

            AgentCommands::Show { id } => match agent_service.get_agent(id).await {
                Ok(agent) => {
                    println!("Agent {}", agent.id);
                    println!("  Name: {}", agent.name);
                    println!("  Port: {}", agent.port);
                    println!("  Status: {}", agent.status);
                    println!("  Created: {}", agent.created_at_display());

                    match agent_service.agent_paths(agent.id).await {
                        Ok(paths) if paths.is_empty() => println!("  Paths: none"),
                        Ok(paths) => {
                            println!("  Paths:");
                            for path in paths {
                                println!("    {} -> {}", path.path, path.response);
                            }
                        }
                        Err(err) => {
                            eprintln!("❌ Failed to load paths: {}", err);
                            std::process::exit(1);
                        }
                    }
                }
                Err(err) => {
                    eprintln!("❌ Failed to find agent: {}", err);
                    std::process::exit(1);
                }
            },
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_spec_splits_on_first_equals() {
        let path = parse_path_spec("/query=a=b").unwrap();
        assert_eq!(path.path, "/query");
        assert_eq!(path.response, "a=b");
    }

    #[test]
    fn test_parse_path_spec_rejects_missing_separator() {
        assert!(parse_path_spec("/health").is_err());
        assert!(parse_path_spec("=body").is_err());
    }
}
