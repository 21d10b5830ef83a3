use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pagegloss::cache::LookupCache;
use pagegloss::collection::{get_settings, get_username};
use pagegloss::morphology::{format_part_of_speech, format_phonetic};
use pagegloss::providers::BackendClient;
use pagegloss::types::{Accent, ReviewQueueItem, WordRecord};
use pagegloss::{LocalStore, LookupPipeline, MessageHub, RuntimeMessage};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "pagegloss", about = "Look up, collect, and review words", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable output.
    #[arg(long, global = true)]
    json: bool,

    /// Path of the local data file.
    #[arg(long, global = true, default_value = "pagegloss-data.json")]
    data: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up a word or phrase.
    Lookup {
        /// Text to look up.
        text: String,
        /// Sentence the text was selected from.
        #[arg(long)]
        sentence: Option<String>,
    },
    /// Operations on the collected-word list.
    #[command(subcommand)]
    Collections(CollectionsCommand),
    /// Operations on the review queue.
    #[command(subcommand)]
    Review(ReviewCommand),
    /// Show or change settings.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Show or change the sync username.
    #[command(subcommand)]
    Username(UsernameCommand),
    /// Run the backend API server.
    #[cfg(feature = "web")]
    Serve {
        /// Address to bind.
        #[arg(long, default_value = "127.0.0.1:3000")]
        addr: std::net::SocketAddr,
    },
}

#[derive(Subcommand, Debug)]
enum CollectionsCommand {
    /// List collected words.
    List,
    /// Look a word up and add the result to the collection.
    Add { word: String },
    /// Remove a word from the collection.
    Remove { word: String },
    /// Push the collection to the backend and adopt the merged state.
    Sync,
}

#[derive(Subcommand, Debug)]
enum ReviewCommand {
    /// List queued words, most recent first.
    List,
    /// Queue a word for review.
    Add { word: String },
    /// Remove a word from the queue.
    Remove { word: String },
    /// Empty the queue.
    Clear,
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Print current settings.
    Show,
    /// Select the accent used for morphology phonetics.
    Accent {
        #[arg(value_parser = ["uk", "us"])]
        accent: String,
    },
}

#[derive(Subcommand, Debug)]
enum UsernameCommand {
    /// Print the stored username.
    Show,
    /// Store a username for backend sync.
    Set { username: String },
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    #[cfg(feature = "web")]
    if let Command::Serve { addr } = &cli.command {
        let config = pagegloss::web::WebConfig {
            addr: *addr,
            data_path: Some(cli.data),
        };
        pagegloss::web::serve(config).await?;
        return Ok(());
    }

    let store = Arc::new(LocalStore::persistent(cli.data));
    let primary = BackendClient::from_env(get_username(&store))
        .map(|client| Box::new(client) as Box<dyn pagegloss::providers::PrimarySource>);
    let pipeline = LookupPipeline::new(LookupCache::new(store.clone()), primary);
    let hub = MessageHub::new(store.clone(), pipeline);

    match cli.command {
        Command::Lookup { text, sentence } => {
            handle(
                &hub,
                RuntimeMessage::LookupWord {
                    payload: pagegloss::message::LookupPayload {
                        text,
                        context_sentence: sentence,
                    },
                },
                cli.json,
                print_record_value,
            )
            .await
        }
        Command::Collections(CollectionsCommand::List) => {
            handle(&hub, RuntimeMessage::GetCollections, cli.json, print_collections).await
        }
        Command::Collections(CollectionsCommand::Add { word }) => {
            let record = lookup_record(&hub, &word).await?;
            let response = hub
                .handle(RuntimeMessage::UpsertCollection {
                    payload: pagegloss::message::UpsertPayload { data: record },
                })
                .await;
            if !response.ok {
                return Err(response.error.unwrap_or_default().into());
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&json!({ "collected": word }))?);
            } else {
                println!("Collected \"{word}\".");
            }
            Ok(())
        }
        Command::Collections(CollectionsCommand::Remove { word }) => {
            handle(
                &hub,
                RuntimeMessage::DeleteCollection {
                    payload: pagegloss::message::WordPayload { word },
                },
                cli.json,
                |_| println!("Removed."),
            )
            .await
        }
        Command::Collections(CollectionsCommand::Sync) => {
            let count = hub.sync_collections().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&json!({ "collections": count }))?);
            } else {
                println!("Synced {count} collections.");
            }
            Ok(())
        }
        Command::Review(ReviewCommand::List) => {
            handle(&hub, RuntimeMessage::GetReviewQueue, cli.json, print_review_queue).await
        }
        Command::Review(ReviewCommand::Add { word }) => {
            handle(
                &hub,
                RuntimeMessage::AddReviewQueue {
                    payload: pagegloss::message::WordPayload { word },
                },
                cli.json,
                |value| {
                    if value["queued"].as_bool().unwrap_or(false) {
                        println!("Queued for review.");
                    } else {
                        println!("Already in review queue.");
                    }
                },
            )
            .await
        }
        Command::Review(ReviewCommand::Remove { word }) => {
            handle(
                &hub,
                RuntimeMessage::DeleteReviewQueue {
                    payload: pagegloss::message::WordPayload { word },
                },
                cli.json,
                |_| println!("Removed."),
            )
            .await
        }
        Command::Review(ReviewCommand::Clear) => {
            handle(&hub, RuntimeMessage::ClearReviewQueue, cli.json, |_| {
                println!("Review queue cleared.")
            })
            .await
        }
        Command::Settings(SettingsCommand::Show) => {
            let settings = get_settings(&store);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                let accent = match settings.morphology_accent {
                    Accent::Uk => "uk",
                    Accent::Us => "us",
                };
                println!("Morphology accent: {accent}");
            }
            Ok(())
        }
        Command::Settings(SettingsCommand::Accent { accent }) => {
            handle(
                &hub,
                RuntimeMessage::SetSettings {
                    payload: json!({ "morphologyAccent": accent }),
                },
                cli.json,
                |value| println!("Morphology accent: {}", value["morphologyAccent"]),
            )
            .await
        }
        Command::Username(UsernameCommand::Show) => {
            handle(&hub, RuntimeMessage::GetUsername, cli.json, |value| {
                match value.as_str() {
                    Some(username) => println!("{username}"),
                    None => println!("No username stored."),
                }
            })
            .await
        }
        Command::Username(UsernameCommand::Set { username }) => {
            handle(
                &hub,
                RuntimeMessage::SetUsername {
                    payload: pagegloss::message::UsernamePayload { username },
                },
                cli.json,
                |_| println!("Username stored."),
            )
            .await
        }
        #[cfg(feature = "web")]
        Command::Serve { .. } => unreachable!("handled before store setup"),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn handle(
    hub: &MessageHub,
    message: RuntimeMessage,
    as_json: bool,
    render: impl FnOnce(&serde_json::Value),
) -> Result<(), Box<dyn Error>> {
    let response = hub.handle(message).await;
    if !response.ok {
        return Err(response.error.unwrap_or_else(|| "request failed".into()).into());
    }
    let data = response.data.unwrap_or(serde_json::Value::Null);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        render(&data);
    }
    Ok(())
}

async fn lookup_record(hub: &MessageHub, word: &str) -> Result<WordRecord, Box<dyn Error>> {
    let response = hub
        .handle(RuntimeMessage::LookupWord {
            payload: pagegloss::message::LookupPayload {
                text: word.to_string(),
                context_sentence: None,
            },
        })
        .await;
    if !response.ok {
        return Err(response.error.unwrap_or_default().into());
    }
    let data = response.data.unwrap_or_default();
    Ok(serde_json::from_value(data)?)
}

fn print_record_value(value: &serde_json::Value) {
    let Ok(record) = serde_json::from_value::<WordRecord>(value.clone()) else {
        println!("{value}");
        return;
    };
    println!("{}", record.word);
    if !record.phonetic.is_empty() {
        println!(
            "UK /{}/  US /{}/",
            format_phonetic(record.phonetic.uk.as_deref()),
            format_phonetic(record.phonetic.us.as_deref())
        );
    }
    if let Some(zh) = &record.translation_zh {
        println!("{zh}");
    }
    for item in &record.definitions {
        println!("- [{}] {}", format_part_of_speech(&item.part_of_speech), item.definition);
        if let Some(translation) = &item.translation {
            println!("    {translation}");
        }
        if let Some(example) = &item.example {
            println!("    e.g. {example}");
        }
    }
    if let Some(tokens) = &record.morphology {
        if tokens.len() > 1 {
            println!("Morphology: {}", tokens.join(" + "));
        }
    }
    if let Some(explanation) = &record.context_explanation_zh {
        println!("{explanation}");
    }
}

fn print_collections(value: &serde_json::Value) {
    let Some(map) = value.as_object() else {
        println!("No collections.");
        return;
    };
    if map.is_empty() {
        println!("No collections.");
        return;
    }
    let width = map.keys().map(String::len).max().unwrap_or(4).max("WORD".len());
    println!("{:<width$}  {}", "WORD", "TRANSLATION", width = width);
    println!("{:-<width$}  {}", "", "-----------", width = width);
    let mut keys: Vec<_> = map.keys().collect();
    keys.sort();
    for key in keys {
        let translation = map[key]["translationZh"].as_str().unwrap_or("-");
        println!("{:<width$}  {}", key, translation, width = width);
    }
}

fn print_review_queue(value: &serde_json::Value) {
    let items: Vec<ReviewQueueItem> =
        serde_json::from_value(value.clone()).unwrap_or_default();
    if items.is_empty() {
        println!("Review queue is empty.");
        return;
    }
    println!("{} word(s) queued, most recent first:", items.len());
    for item in items {
        println!("- {}", item.word);
    }
}
