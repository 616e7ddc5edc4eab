use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use guidepost_config::{ConfigLoader, GuidepostConfig};
use guidepost_core::{GuidepostError, HaltResult, NodeId, SessionId};
use guidepost_corpus::{CorpusIndex, CorpusStore};
use guidepost_engine::{EngineConfig, Executor, ProfileFactProvider};
use guidepost_matcher::{KeywordMatcher, MatchPolicy};
use guidepost_session::{InvestigationDiary, SessionManager, SessionStore};
use guidepost_validator::{validate, ValidatorConfig, Violation};

mod chat;

/// 🧭 Guidepost — Guided workflow router for operational runbooks
#[derive(Parser)]
#[command(name = "guidepost", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to guidepost.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint the corpus graph: reachability, termination, authority
    Validate {
        /// Corpus root (overrides config)
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one conversational turn against a session
    Turn {
        /// Session ID to run the turn in
        #[arg(short, long)]
        session: String,
        /// The user utterance
        utterance: String,
    },
    /// Interactive guidance in the terminal
    Chat {
        /// Session ID to resume (creates new if omitted)
        #[arg(short, long)]
        session: Option<String>,
    },
    /// Manage sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
    /// Show a session's investigation diary
    Diary {
        /// Session ID
        #[arg(short, long)]
        session: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set a config value in guidepost.toml (dot-notation key)
    Set {
        /// Config key in dot notation (e.g. matcher.min_confidence)
        key: String,
        /// Value to set
        value: String,
    },
    /// Initialize a new guidepost.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.guidepost/
        #[arg(long)]
        local: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
    /// Show version and build info
    Version,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Create a new session
    New {
        /// Profile facts as key=value pairs, bound at creation
        #[arg(short, long, value_parser = parse_key_val)]
        profile: Vec<(String, String)>,
    },
    /// List sessions
    List,
    /// Bind the execution profile (fails if one is already bound)
    Bind {
        /// Session ID
        id: String,
        /// Profile facts as key=value pairs
        #[arg(short, long, value_parser = parse_key_val, required = true)]
        profile: Vec<(String, String)>,
    },
    /// Clear the bound profile so it can be re-bound
    Reset {
        /// Session ID
        id: String,
    },
    /// Close a session
    Close {
        /// Session ID
        id: String,
    },
}

/// Parse "key=value" CLI arguments.
fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no `=` found in `{s}`"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn parse_session_id(s: &str) -> guidepost_core::Result<SessionId> {
    s.parse::<SessionId>()
        .map_err(|_| GuidepostError::SessionNotFound(s.to_string()))
}

impl Cli {
    /// Run the selected command and return the process exit code.
    /// Turn outcomes map to 0 (success), 1 (error), 2 (awaiting choice).
    pub async fn run(self) -> guidepost_core::Result<i32> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // Resolve log level: --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug".to_string()
        } else if self.quiet {
            "error".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| config.logging.level.clone())
        };

        if config.logging.format == "json" {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .json()
                .with_target(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
                )
                .with_target(false)
                .init();
        }

        match self.command {
            Commands::Validate { corpus, json } => Self::cmd_validate(config, corpus, json),
            Commands::Turn { session, utterance } => {
                Self::cmd_turn(config, &session, &utterance).await
            }
            Commands::Chat { session } => chat::cmd_chat(config, session).await,
            Commands::Session { action } => Self::cmd_session(config, action).await,
            Commands::Diary { session, json } => Self::cmd_diary(config, &session, json),
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Set { key, value } => {
                Self::cmd_config_set(config_loader.path().to_path_buf(), key, value)
            }
            Commands::Init { local } => Self::cmd_init(local),
            Commands::Completions { shell } => Self::cmd_completions(shell),
            Commands::Version => Self::cmd_version(),
        }
    }

    fn cmd_validate(
        config: GuidepostConfig,
        corpus: Option<PathBuf>,
        json: bool,
    ) -> guidepost_core::Result<i32> {
        let root = corpus.unwrap_or_else(|| config.corpus.root.clone());
        let index = CorpusIndex::load(&root)?;

        let vconfig = ValidatorConfig {
            entry_points: config
                .validator
                .entry_points
                .iter()
                .map(|s| NodeId::from(s.as_str()))
                .collect(),
            max_depth: config.validator.max_depth,
            orphan_allowlist: config
                .validator
                .orphan_allowlist
                .iter()
                .map(|s| NodeId::from(s.as_str()))
                .collect(),
        };
        let report = validate(&index, &vconfig);

        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            println!(
                "🧭 Validated {} nodes ({} reachable)",
                index.len(),
                report.reachable
            );
            for v in &report.violations {
                match v {
                    Violation::MissingEntryPoint { node } => {
                        println!("  ❌ missing entry point: {node}")
                    }
                    Violation::Orphan { node } => {
                        println!("  ❌ orphan: {node} is unreachable from every entry point")
                    }
                    Violation::NonTerminating { cycle } => {
                        let ids: Vec<String> = cycle.iter().map(|n| n.to_string()).collect();
                        println!(
                            "  ❌ non-terminating cycle with no path to a halt: {}",
                            ids.join(" → ")
                        )
                    }
                    Violation::DepthExceeded { node, nearest_halt } => println!(
                        "  ❌ {node}: nearest halting node is {nearest_halt} hops away (max {})",
                        config.validator.max_depth
                    ),
                    Violation::AmbiguousAuthority { tag, nodes } => {
                        let ids: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
                        println!(
                            "  ❌ ambiguous authority for '{tag}': {} declare no supersedes/conflicts_with relation",
                            ids.join(", ")
                        )
                    }
                }
            }
            if report.is_clean() {
                println!("  ✅ no violations");
            } else {
                println!("  {} violation(s)", report.violations.len());
            }
        }

        Ok(if report.is_clean() { 0 } else { 1 })
    }

    async fn cmd_turn(
        config: GuidepostConfig,
        session: &str,
        utterance: &str,
    ) -> guidepost_core::Result<i32> {
        let id = parse_session_id(session)?;
        let executor = build_executor(&config).await?;

        let outcome = executor.run_turn(id, utterance).await?;
        for line in &outcome.transcript {
            println!("  {line}");
        }
        print_halt(&outcome.halt);
        Ok(outcome.halt.exit_code())
    }

    async fn cmd_session(
        config: GuidepostConfig,
        action: SessionAction,
    ) -> guidepost_core::Result<i32> {
        let sessions = build_sessions(&config).await?;

        match action {
            SessionAction::New { profile } => {
                let id = sessions.create().await?;
                if !profile.is_empty() {
                    sessions
                        .set_profile(id, profile.into_iter().collect::<HashMap<_, _>>())
                        .await?;
                }
                println!("{id}");
            }
            SessionAction::List => {
                let all = sessions.list().await;
                if all.is_empty() {
                    println!("No sessions.");
                } else {
                    for s in all {
                        let state = if !s.active {
                            "closed"
                        } else if !s.stack.is_empty() {
                            "suspended"
                        } else {
                            "idle"
                        };
                        println!(
                            "  {}  {}  {} turn(s), created {}",
                            s.id,
                            state,
                            s.turn_count,
                            s.created_at.format("%Y-%m-%d %H:%M UTC")
                        );
                    }
                }
            }
            SessionAction::Bind { id, profile } => {
                let id = parse_session_id(&id)?;
                sessions
                    .set_profile(id, profile.into_iter().collect::<HashMap<_, _>>())
                    .await?;
                sessions.checkpoint(id).await?;
                println!("✅ profile bound");
            }
            SessionAction::Reset { id } => {
                let id = parse_session_id(&id)?;
                sessions.reset_profile(id).await?;
                sessions.checkpoint(id).await?;
                println!("✅ profile cleared");
            }
            SessionAction::Close { id } => {
                let id = parse_session_id(&id)?;
                sessions.close(id).await?;
                println!("✅ session closed");
            }
        }
        Ok(0)
    }

    fn cmd_diary(
        config: GuidepostConfig,
        session: &str,
        json: bool,
    ) -> guidepost_core::Result<i32> {
        let id = parse_session_id(session)?;
        let diary = if config.storage.persist_sessions {
            InvestigationDiary::with_store(Arc::new(SessionStore::open(&config.storage.db_path)?))
        } else {
            InvestigationDiary::new()
        };
        diary.open(id)?;
        let entries = diary.read(id);

        if json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        } else if entries.is_empty() {
            println!("No diary entries for session {id}.");
        } else {
            for e in entries {
                println!("  [{}] {}", e.timestamp.format("%Y-%m-%d %H:%M:%S UTC"), e.hypothesis);
                println!("        evidence: {}", e.evidence);
                if let Some(outcome) = e.outcome {
                    println!("        outcome: {outcome}");
                }
            }
        }
        Ok(0)
    }

    fn cmd_config(config: GuidepostConfig, json: bool) -> guidepost_core::Result<i32> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config)
                    .map_err(|e| GuidepostError::Config(e.to_string()))?
            );
        }
        Ok(0)
    }

    fn cmd_config_set(path: PathBuf, key: String, value: String) -> guidepost_core::Result<i32> {
        if !path.exists() {
            return Err(GuidepostError::Config(
                "No config file found. Run 'guidepost init' first.".into(),
            ));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            GuidepostError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        let mut doc = content.parse::<toml_edit::DocumentMut>().map_err(|e| {
            GuidepostError::Config(format!("Invalid TOML in {}: {}", path.display(), e))
        })?;

        // Dot-notation key → table path, e.g. "matcher.tie_epsilon"
        let parts: Vec<&str> = key.split('.').collect();
        if parts.is_empty() {
            return Err(GuidepostError::Config("Empty key".into()));
        }

        let table_parts = &parts[..parts.len() - 1];
        let leaf_key = parts[parts.len() - 1];

        let mut table: &mut toml_edit::Item = doc.as_item_mut();
        for part in table_parts {
            if table.get(part).is_none() {
                table[part] = toml_edit::Item::Table(toml_edit::Table::new());
            }
            table = &mut table[part];
        }

        // Infer the value type: bool, integer, float, or string
        let toml_value = if value == "true" {
            toml_edit::value(true)
        } else if value == "false" {
            toml_edit::value(false)
        } else if let Ok(i) = value.parse::<i64>() {
            toml_edit::value(i)
        } else if let Ok(f) = value.parse::<f64>() {
            toml_edit::value(f)
        } else {
            toml_edit::value(&value)
        };

        let old_value = table.get(leaf_key).map(|v| v.to_string());
        table[leaf_key] = toml_value;

        std::fs::write(&path, doc.to_string()).map_err(|e| {
            GuidepostError::Config(format!("Cannot write {}: {}", path.display(), e))
        })?;

        match old_value {
            Some(old) => println!("✅ {} = {} (was {})", key, value, old.trim()),
            None => println!("✅ {} = {} (new)", key, value),
        }

        Ok(0)
    }

    fn cmd_init(local: bool) -> guidepost_core::Result<i32> {
        let dir = if local {
            std::env::current_dir()?
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".guidepost")
        };

        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("guidepost.toml");

        if config_path.exists() {
            println!("⚠️  {} already exists", config_path.display());
            return Ok(0);
        }

        let minimal = r#"# 🧭 Guidepost Configuration

[corpus]
root = "corpus"
# watch = false           # hot-reload the corpus when node files change

[matcher]
# min_confidence = 0.25   # candidates below this confidence are dropped
# tie_epsilon = 0.1       # confidence band within which tier precedence decides

[engine]
# complexity_threshold = 8
# max_steps_per_turn = 64
# cache_ttl_secs = 300

[validator]
entry_points = ["start"]
# max_depth = 50
# orphan_allowlist = []

[storage]
db_path = "guidepost.db"
# persist_sessions = true

[logging]
level = "info"
# format = "pretty"
"#;

        std::fs::write(&config_path, minimal)?;
        println!("✅ Created {}", config_path.display());
        println!("   Point [corpus] root at your NODE.md tree, then run: guidepost validate");

        Ok(0)
    }

    fn cmd_completions(shell: Shell) -> guidepost_core::Result<i32> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "guidepost", &mut std::io::stdout());
        Ok(0)
    }

    fn cmd_version() -> guidepost_core::Result<i32> {
        println!("🧭 Guidepost v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(0)
    }
}

/// Session manager wired to the configured storage backend.
async fn build_sessions(config: &GuidepostConfig) -> guidepost_core::Result<SessionManager> {
    if config.storage.persist_sessions {
        let store = Arc::new(SessionStore::open(&config.storage.db_path)?);
        SessionManager::with_store(store).await
    } else {
        Ok(SessionManager::new())
    }
}

/// Full executor stack from config: corpus, sessions, diary, matcher,
/// provider.
pub(crate) async fn build_executor(config: &GuidepostConfig) -> guidepost_core::Result<Executor> {
    let corpus = CorpusStore::open(&config.corpus.root)?;
    let (sessions, diary) = if config.storage.persist_sessions {
        let store = Arc::new(SessionStore::open(&config.storage.db_path)?);
        (
            SessionManager::with_store(Arc::clone(&store)).await?,
            InvestigationDiary::with_store(store),
        )
    } else {
        (SessionManager::new(), InvestigationDiary::new())
    };

    Ok(Executor::new(
        corpus,
        sessions,
        diary,
        Arc::new(KeywordMatcher),
        Arc::new(ProfileFactProvider),
        MatchPolicy {
            min_confidence: config.matcher.min_confidence,
            tie_epsilon: config.matcher.tie_epsilon,
        },
        EngineConfig {
            complexity_threshold: config.engine.complexity_threshold,
            max_steps_per_turn: config.engine.max_steps_per_turn,
            cache_ttl_secs: config.engine.cache_ttl_secs,
        },
    ))
}

pub(crate) fn print_halt(halt: &HaltResult) {
    match halt {
        HaltResult::Success { message } => println!("✅ {message}"),
        HaltResult::Choice { prompt } => println!("❓ {prompt}"),
        HaltResult::Error { kind, message } => println!("❌ [{kind}] {message}"),
    }
}
