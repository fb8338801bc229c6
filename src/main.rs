//! Pet Evolution Console
//!
//! Line-oriented front end over `PetCore`:
//! register, record, judge, score, show, oracle.

use anyhow::Result;
use ollama_rs::Ollama;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use pet_evolution::agent::{
    CachedProvider, GenerationCache, OfflineGenerator, OllamaProvider, OpenAICompatibleProvider,
    TextGenerator,
};
use pet_evolution::oracle::Dimension;
use pet_evolution::orchestrator::{PetEvent, PET_EVENT_BUS};
use pet_evolution::utils::init_logging;
use pet_evolution::{
    ConfigManager, InMemoryPetStore, JudgmentOutcome, PetConfig, PetCore, PetStore, Rarity,
    SqlitePetStore,
};

const HELP: &str = "\
Commands:
  register <name> <rarity> <species...>
  record <pet_id> <action> [target] [context...]
  judge <pet_id>
  score <pet_id> [environment...]
  show <pet_id>
  oracle [pet_id]
  list | sweep | help | quit";

// ──────────────────────────────────────────────────────────────────────────────
// SETUP
// ──────────────────────────────────────────────────────────────────────────────

fn build_generator(config: &PetConfig) -> Arc<dyn TextGenerator> {
    let inner: Arc<dyn TextGenerator> = if std::env::var("PET_OFFLINE").is_ok() {
        info!("Text generation disabled, using fallback content");
        Arc::new(OfflineGenerator)
    } else if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
        info!("Using OpenAI-compatible generator at {}", base_url);
        Arc::new(OpenAICompatibleProvider::new(
            base_url,
            std::env::var("OPENAI_API_KEY").ok(),
            config.generation.model.clone(),
        ))
    } else {
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| config.generation.model.clone());
        info!("Using Ollama generator with model {}", model);
        Arc::new(
            OllamaProvider::new(Ollama::default(), model)
                .with_system("You narrate the growth of virtual pets. Answer with JSON only."),
        )
    };
    Arc::new(CachedProvider::new(inner, Arc::new(GenerationCache::new())))
}

async fn build_store() -> Result<Arc<dyn PetStore>> {
    let db = std::env::var("PET_DB").unwrap_or_else(|_| "pets.db".to_string());
    if db == ":memory:" {
        info!("Using in-memory store");
        return Ok(Arc::new(InMemoryPetStore::new()));
    }
    info!("Using sqlite store at {}", db);
    Ok(Arc::new(SqlitePetStore::new(&db).await?))
}

/// Prints pipeline events as they happen, since judgments run in the background.
fn spawn_event_printer() {
    let mut rx = PET_EVENT_BUS.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                PetEvent::JudgmentCompleted { pet_id, accumulated_weight, should_evolve } => {
                    println!("\n⚖️  {} judged: weight {:.2}, evolve={}", pet_id, accumulated_weight, should_evolve)
                }
                PetEvent::DescriptorEvolved { pet_id, used_fallback } => {
                    println!("\n✨ {} evolved{}", pet_id, if used_fallback { " (fallback)" } else { "" })
                }
                PetEvent::TraitsSolidified { pet_id, added, deactivated } => {
                    println!("\n🧬 {} gained {} trait(s), retired {}", pet_id, added, deactivated)
                }
                _ => {}
            }
        }
    });
}

// ──────────────────────────────────────────────────────────────────────────────
// COMMANDS
// ──────────────────────────────────────────────────────────────────────────────

async fn run_command(core: &PetCore, line: &str) -> Result<()> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let rest = |from: usize| parts.get(from..).map(|p| p.join(" ")).unwrap_or_default();

    match parts.as_slice() {
        ["help"] => println!("{}", HELP),
        ["list"] => {
            for pet in core.list_pets().await? {
                println!("  {}  {} ({} {}, lvl {})", pet.id, pet.name, pet.rarity, pet.species, pet.level);
            }
        }
        ["register", name, rarity, _, ..] => {
            let rarity: Rarity = rarity.parse().map_err(anyhow::Error::msg)?;
            let pet = core.register_pet(name, &rest(3), rarity).await?;
            println!("🐣 Registered {} as {}", pet.name, pet.id);
        }
        ["record", pet_id, action, ..] => {
            let target = parts.get(3).copied().unwrap_or("");
            let id = core.record_behavior(pet_id, action, target, &rest(4)).await?;
            println!("📝 Recorded {} ({})", action, id);
        }
        ["judge", pet_id] => match core.judge_pet(pet_id).await? {
            JudgmentOutcome::CoolingDown { remaining } => {
                println!("⏳ Cooling down, {}s left", remaining.num_seconds())
            }
            JudgmentOutcome::NoEvents => println!("💤 Nothing to judge"),
            JudgmentOutcome::Contended => println!("🔒 Another judgment is running"),
            JudgmentOutcome::Judged { record, evolution } => {
                println!("⚖️  {}", record.detail.summary);
                if let Some(evolution) = evolution {
                    println!("✨ New descriptor:\n{}", evolution.new_descriptor);
                }
            }
        },
        ["score", pet_id, ..] => {
            for (rank, candidate) in core.score_paths(pet_id, &rest(2)).await?.iter().enumerate() {
                println!(
                    "  {}. {} → {} (score {:.3}) tags {:?} delta {:?}",
                    rank + 1,
                    candidate.form,
                    candidate.target_rarity,
                    candidate.score,
                    candidate.tags,
                    candidate.stat_delta
                );
            }
        }
        ["show", pet_id] => {
            let pet = core.get_pet(pet_id).await?;
            println!("{}", serde_json::to_string_pretty(&pet)?);
            println!(
                "judgments: {}, evolutions: {}, traits ever: {}",
                core.judgments(pet_id).await?.len(),
                core.descriptor_history(pet_id).await?.len(),
                core.trait_history(pet_id).await?.len()
            );
        }
        ["oracle", pet_id] => match core.oracle().latest(pet_id).await {
            Some(feedback) => {
                println!("{} {}: {}", feedback.hexagram.symbol, feedback.hexagram.name, feedback.hexagram.interpretation);
                println!("{}", feedback.register.describe());
                for advice in feedback.advice {
                    println!("  • {}", advice);
                }
            }
            None => println!("No readings for {} yet", pet_id),
        },
        ["oracle"] => {
            let register = core.oracle().aggregate().await;
            for dimension in Dimension::ALL {
                let state = register.get(dimension);
                println!(
                    "  {}: {} ({:+.2})",
                    dimension.name(),
                    dimension.position_label(state.position),
                    state.scalar
                );
            }
        }
        ["sweep"] => println!("🧹 Removed {} processed events", core.sweep().await?),
        _ => println!("Unknown command. Type 'help'."),
    }
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// MAIN ENTRY POINT
// ──────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let log_dir = std::env::var("PET_LOG_DIR").ok().map(PathBuf::from);
    let _log_guard = init_logging(log_dir.as_deref())?;

    let config_path = std::env::var("PET_CONFIG").unwrap_or_else(|_| "pet_config.yaml".to_string());
    let config = ConfigManager::new(&config_path).load().await?;
    info!("Loaded configuration from {}", config_path);

    let store = build_store().await?;
    let generator = build_generator(&config);
    let core = PetCore::new(store, generator, config);
    spawn_event_printer();

    println!("\n{}", "═".repeat(60));
    println!("🐾 Pet Evolution Console v{}", env!("CARGO_PKG_VERSION"));
    println!("{}", "═".repeat(60));
    println!("{}\n", HELP);

    loop {
        print!("🐾 > ");
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let line = input.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit" | "q") {
            println!("\n👋 Goodbye!\n");
            break;
        }

        if let Err(e) = run_command(&core, line).await {
            println!("❌ {}", e);
        }
    }

    Ok(())
}
