//! Plays one full Republic of Bean session from the terminal.
//!
//! Agents are driven by OpenRouter when `OPENROUTER_API_KEY` is set and by a
//! scripted oracle otherwise. Pass a YAML config path as the first argument.
//! Set `store_path` in the config to resume an interrupted session.

use bean_parliament::prelude::*;
use bean_parliament::storage::KeyValueStore;
use bean_parliament::tracing_ext::{init_tracing, LogFormat};
use bean_parliament::{OpenRouterClient, OptionSelector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let format = std::env::var("BEAN_LOG_FORMAT")
        .ok()
        .map(|f| f.parse())
        .transpose()?
        .unwrap_or(LogFormat::Pretty);
    init_tracing(format)?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = GameConfig::load(config_path.as_deref())?;
    let catalog = PolicyCatalog::builtin();

    let (preferences, opinions) = oracles(&config)?;

    match config.store_path.clone() {
        Some(path) => {
            let store = SessionStore::new(SledStore::open(path)?);
            play(&store, &catalog, &config, preferences.as_ref(), opinions.as_ref()).await
        }
        None => {
            let store = SessionStore::new(MemoryStore::new());
            play(&store, &catalog, &config, preferences.as_ref(), opinions.as_ref()).await
        }
    }
}

fn oracles(config: &GameConfig) -> anyhow::Result<(Arc<dyn PreferenceOracle>, Arc<dyn OpinionSource>)> {
    if std::env::var("OPENROUTER_API_KEY").is_err() {
        println!("OPENROUTER_API_KEY not set, agents follow a script\n");
        let scripted = Arc::new(ScriptedOracle::default());
        let preferences: Arc<dyn PreferenceOracle> = scripted.clone();
        let opinions: Arc<dyn OpinionSource> = scripted;
        return Ok((preferences, opinions));
    }

    let client = OpenRouterClient::from_env()?;
    let oracle = Arc::new(
        LlmOracle::new(Arc::new(client), config.model.clone())
            .with_fallback_option(OptionId::new(config.fallback_option)?),
    );
    let preferences: Arc<dyn PreferenceOracle> = oracle.clone();
    let opinions: Arc<dyn OpinionSource> = oracle;
    Ok((preferences, opinions))
}

async fn play<S: KeyValueStore>(
    store: &SessionStore<S>,
    catalog: &PolicyCatalog,
    config: &GameConfig,
    preferences: &dyn PreferenceOracle,
    opinions: &dyn OpinionSource,
) -> anyhow::Result<()> {
    let mut rng = match config.tie_break_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut tie_breaker = RandomTieBreaker::from_config(config);

    let mut session = store.load_or_start(catalog, config, &mut rng)?;
    println!("Session {} ({})", session.id(), session.phase());
    for agent in session.roster().iter() {
        println!("  {} - {}", agent.name, agent.role);
    }
    println!();

    if session.phase() == SessionPhase::IndividualSelection {
        choose_individually(&mut session, &mut rng)?;
        store.save(&session)?;
    }

    if session.phase() == SessionPhase::Discussion {
        for policy in catalog.iter() {
            println!("== {} ==", policy.title);
            for opinion in session.discuss(policy.id, opinions).await? {
                println!("  [{}] {}", opinion.agent, opinion.text);
            }
            store.save(&session)?;
        }
        session.finish_discussion()?;
        store.save(&session)?;
    }

    let selector = OptionSelector::for_catalog(catalog);
    while let SessionPhase::Voting { next_policy } = session.phase() {
        let policy = catalog.policy(next_policy)?;
        let wish = session.selections().get(next_policy).unwrap_or(OptionId::ONE);
        let remaining = session.remaining(&ActorId::User)?;
        let vote = selector.choose_effective_option(remaining, policy, wish)?;

        let record = session
            .vote_policy(next_policy, vote, preferences, &mut tie_breaker)
            .await?;
        println!(
            "Policy {} ({}): you voted {}, parliament adopted {}{}",
            next_policy,
            policy.title,
            vote,
            record.final_option(),
            if record.resolution.tie_occurred { " after a tie" } else { "" }
        );
        store.save(&session)?;
    }

    println!();
    println!("{}", session.summary()?);
    store.end()?;
    Ok(())
}

/// Random answers, each downgraded until it fits
fn choose_individually<R: Rng>(session: &mut SessionState, rng: &mut R) -> anyhow::Result<()> {
    let ids: Vec<PolicyId> = session.catalog().ids().collect();
    for policy in &ids {
        let wish = rng.gen_range(1..=3u8);
        for option in (1..=wish).rev() {
            if session.select_individual(*policy, OptionId::new(option)?).is_ok() {
                break;
            }
        }
    }

    match session.submit_individual() {
        Ok(()) => Ok(()),
        Err(Error::DegenerateSelection { option, .. }) => {
            let other = if option == OptionId::ONE { OptionId::TWO } else { OptionId::ONE };
            session.select_individual(ids[0], other)?;
            session.submit_individual()?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
