//! `keel session`: saved session summaries.

use chrono::{DateTime, Local, Utc};
use clap::Subcommand;
use keel_memory::{SessionStore, format_session_for_prompt};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Show the latest session summary
    Show,

    /// List archived sessions, newest first
    List,
}

pub fn run(action: SessionAction) -> anyhow::Result<()> {
    let store = SessionStore::new(super::current_paths()?.sessions_dir());
    match action {
        SessionAction::Show => match store.load_latest() {
            Some(session) => {
                println!("📋 Session {} (ended {})", session.id, local_time(session.ended_at));
                println!();
                println!("{}", format_session_for_prompt(&session));
                if !session.files_modified.is_empty() {
                    println!("Files modified:");
                    for file in &session.files_modified {
                        println!("- {file}");
                    }
                }
            }
            None => println!("   No saved session in {}", store.dir().display()),
        },
        SessionAction::List => {
            let sessions = store.list();
            if sessions.is_empty() {
                println!("   No archived sessions in {}", store.dir().display());
            }
            for session in sessions {
                println!(
                    "  {}  {:<11}  {}",
                    local_time(session.ended_at),
                    session.status.as_str(),
                    session.title
                );
            }
        }
    }
    Ok(())
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
