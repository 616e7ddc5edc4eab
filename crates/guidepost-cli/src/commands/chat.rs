use tokio::io::AsyncBufReadExt;
use tracing::warn;

use guidepost_config::GuidepostConfig;
use guidepost_core::SessionId;

use super::{build_executor, parse_session_id, print_halt};

pub(super) async fn cmd_chat(
    config: GuidepostConfig,
    session: Option<String>,
) -> guidepost_core::Result<i32> {
    let executor = build_executor(&config).await?;

    // Keep the watcher handle alive for the whole chat.
    let _watcher = if config.corpus.watch {
        match executor.corpus().watch() {
            Ok(w) => Some(w),
            Err(e) => {
                warn!(error = %e, "corpus hot-reload disabled");
                None
            }
        }
    } else {
        None
    };

    let session_id: SessionId = match session {
        Some(ref s) => {
            let id = parse_session_id(s)?;
            if executor.sessions().get(id).await.is_none() {
                return Err(guidepost_core::GuidepostError::SessionNotFound(s.clone()));
            }
            id
        }
        None => executor.sessions().create().await?,
    };

    println!("🧭 Guidepost Interactive Guidance");
    println!("   Session: {session_id}");
    println!("   Type 'exit' or Ctrl+C to quit");
    println!();

    let stdin = tokio::io::stdin();
    let reader = tokio::io::BufReader::new(stdin);
    let mut lines = reader.lines();

    loop {
        eprint!("\x1b[36myou>\x1b[0m ");
        use std::io::Write;
        std::io::stderr().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed == "exit" || trimmed == "quit" || trimmed == "/exit" {
            println!("👋 Goodbye!");
            break;
        }

        match executor.run_turn(session_id, trimmed).await {
            Ok(outcome) => {
                for entry in &outcome.transcript {
                    println!("  \x1b[90m{entry}\x1b[0m");
                }
                print_halt(&outcome.halt);
            }
            Err(e) => {
                println!("\x1b[31m❌ {e}\x1b[0m");
            }
        }
        println!();
    }

    Ok(0)
}
