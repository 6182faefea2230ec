//! pulse-control - CLI for the Pulse assistant daemon
//!
//! Talks to `org.pulse.Assistant` on the session bus.

use clap::{Parser, Subcommand};
use zbus::blocking::Connection;

/// CLI control utility for the Pulse assistant daemon
#[derive(Parser)]
#[command(name = "pulse-control")]
#[command(author = "StarTuz")]
#[command(version)]
#[command(about = "Control utility for the Pulse dashboard assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check service health
    Ping,

    /// Get daemon version
    Version,

    /// Show what the assistant thinks you are looking at
    Status,

    /// Tell the assistant which dashboard route is open
    Navigate {
        /// Route, e.g. /whales or /risk
        route: String,
    },

    /// Select an entity on the dashboard
    Select {
        /// Entity id
        id: String,
        /// Entity kind (wallet, exchange, cluster...)
        #[arg(short, long, default_value = "entity")]
        kind: String,
        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
    },

    /// Clear the selected entity
    Deselect,

    /// Ask the assistant a question
    Ask {
        /// Question text
        text: Vec<String>,
    },

    /// Refetch every intelligence source
    Refresh,

    /// Voice listening control
    Voice {
        #[command(subcommand)]
        action: VoiceAction,
    },

    /// Proactive alert preferences
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },
}

#[derive(Subcommand)]
enum VoiceAction {
    /// Listen for the wake phrase continuously
    Wake,
    /// Stop wake-phrase listening
    Unwake,
    /// Listen for a single utterance
    Mic,
    /// Stop the single-utterance session
    Unmic,
    /// Show the listening state
    State,
}

#[derive(Subcommand)]
enum AlertAction {
    /// Print the stored preferences as JSON
    Show,
    /// Enable proactive alerts
    On,
    /// Disable proactive alerts
    Off,
    /// Turn spoken alerts on or off
    Speak {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Configure one alert category
    Category {
        /// Category, e.g. WHALE_SPIKE
        category: String,
        /// Minimum severity: low, medium, high, critical
        #[arg(short, long, default_value = "medium")]
        min_severity: String,
        /// Disable the category instead of enabling it
        #[arg(long)]
        disable: bool,
    },
    /// Set quiet hours (HH:MM)
    Quiet {
        start: String,
        end: String,
        /// Turn quiet hours off
        #[arg(long)]
        disable: bool,
        /// Suppress critical alerts too
        #[arg(long)]
        block_critical: bool,
    },
    /// Set rate limits
    Rate {
        /// Maximum proactive alerts per rolling hour
        max_per_hour: u32,
        /// Minimum seconds between alerts
        min_interval_secs: u64,
        /// Apply limits to critical alerts as well
        #[arg(long)]
        no_critical_bypass: bool,
    },
    /// Restore default preferences
    Reset,
}

fn set_proactive(conn: &Connection, enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
    let _: () = conn
        .call_method(
            Some("org.pulse.Assistant"),
            "/org/pulse/Assistant",
            Some("org.pulse.Assistant"),
            "SetProactiveEnabled",
            &enabled,
        )?
        .body()
        .deserialize()?;
    println!("Proactive alerts {}", if enabled { "enabled" } else { "disabled" });
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let conn = Connection::session()?;

    let dest = "org.pulse.Assistant";
    let path = "/org/pulse/Assistant";
    let iface = "org.pulse.Assistant";

    match cli.command {
        Commands::Ping => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "Ping", &())?
                .body()
                .deserialize()?;
            println!("{}", result);
        }

        Commands::Version => {
            let result: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVersion", &())?
                .body()
                .deserialize()?;
            println!("pulse-assistant {}", result);
        }

        Commands::Status => {
            let version: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVersion", &())?
                .body()
                .deserialize()?;
            let voice: String = conn
                .call_method(Some(dest), path, Some(iface), "GetVoiceState", &())?
                .body()
                .deserialize()?;
            let summary: String = conn
                .call_method(Some(dest), path, Some(iface), "GetContextSummary", &())?
                .body()
                .deserialize()?;

            println!("Pulse Assistant Status");
            println!("──────────────────────");
            println!("Version:  {}", version);
            println!("Voice:    {}", voice);
            println!("Context:  {}", summary);
        }

        Commands::Navigate { route } => {
            let module: String = conn
                .call_method(Some(dest), path, Some(iface), "Navigate", &route)?
                .body()
                .deserialize()?;
            println!("Now on {} ({})", route, module);
        }

        Commands::Select { id, kind, name } => {
            let _: () = conn
                .call_method(Some(dest), path, Some(iface), "SelectEntity", &(id.clone(), kind, name))?
                .body()
                .deserialize()?;
            println!("Selected {}", id);
        }

        Commands::Deselect => {
            let _: () = conn
                .call_method(Some(dest), path, Some(iface), "ClearEntity", &())?
                .body()
                .deserialize()?;
            println!("Selection cleared");
        }

        Commands::Ask { text } => {
            let question = text.join(" ");
            let answer: String = conn
                .call_method(Some(dest), path, Some(iface), "Ask", &question)?
                .body()
                .deserialize()?;
            println!("{}", answer);
        }

        Commands::Refresh => {
            println!("Refreshing intelligence...");
            let failed: u32 = conn
                .call_method(Some(dest), path, Some(iface), "Refresh", &())?
                .body()
                .deserialize()?;
            if failed == 0 {
                println!("All sources up to date");
            } else {
                println!("{} source(s) unavailable, using neutral data", failed);
            }
        }

        Commands::Voice { action } => {
            let method = match action {
                VoiceAction::Wake => "StartWakeMode",
                VoiceAction::Unwake => "StopWakeMode",
                VoiceAction::Mic => "StartManualMic",
                VoiceAction::Unmic => "StopManualMic",
                VoiceAction::State => "GetVoiceState",
            };
            if method == "GetVoiceState" {
                let state: String = conn
                    .call_method(Some(dest), path, Some(iface), method, &())?
                    .body()
                    .deserialize()?;
                println!("{}", state);
            } else {
                let _: () = conn
                    .call_method(Some(dest), path, Some(iface), method, &())?
                    .body()
                    .deserialize()?;
                let state: String = conn
                    .call_method(Some(dest), path, Some(iface), "GetVoiceState", &())?
                    .body()
                    .deserialize()?;
                println!("Voice: {}", state);
            }
        }

        Commands::Alerts { action } => match action {
            AlertAction::Show => {
                let json: String = conn
                    .call_method(Some(dest), path, Some(iface), "GetPreferences", &())?
                    .body()
                    .deserialize()?;
                let pretty = serde_json::from_str::<serde_json::Value>(&json)
                    .and_then(|v| serde_json::to_string_pretty(&v))
                    .unwrap_or(json);
                println!("{}", pretty);
            }
            AlertAction::On => set_proactive(&conn, true)?,
            AlertAction::Off => set_proactive(&conn, false)?,
            AlertAction::Speak { enabled } => {
                let _: () = conn
                    .call_method(Some(dest), path, Some(iface), "SetVoiceAlerts", &enabled)?
                    .body()
                    .deserialize()?;
                println!("Spoken alerts {}", if enabled { "on" } else { "off" });
            }
            AlertAction::Category {
                category,
                min_severity,
                disable,
            } => {
                let _: () = conn
                    .call_method(
                        Some(dest),
                        path,
                        Some(iface),
                        "SetCategory",
                        &(category.clone(), !disable, min_severity.clone()),
                    )?
                    .body()
                    .deserialize()?;
                if disable {
                    println!("{} disabled", category);
                } else {
                    println!("{} enabled at {} and above", category, min_severity);
                }
            }
            AlertAction::Quiet {
                start,
                end,
                disable,
                block_critical,
            } => {
                let _: () = conn
                    .call_method(
                        Some(dest),
                        path,
                        Some(iface),
                        "SetQuietHours",
                        &(!disable, start.clone(), end.clone(), !block_critical),
                    )?
                    .body()
                    .deserialize()?;
                if disable {
                    println!("Quiet hours off");
                } else {
                    println!("Quiet hours {} - {}", start, end);
                }
            }
            AlertAction::Rate {
                max_per_hour,
                min_interval_secs,
                no_critical_bypass,
            } => {
                let _: () = conn
                    .call_method(
                        Some(dest),
                        path,
                        Some(iface),
                        "SetRateLimit",
                        &(max_per_hour, min_interval_secs, !no_critical_bypass),
                    )?
                    .body()
                    .deserialize()?;
                println!(
                    "At most {} alerts per hour, {}s apart",
                    max_per_hour, min_interval_secs
                );
            }
            AlertAction::Reset => {
                let _: () = conn
                    .call_method(Some(dest), path, Some(iface), "ResetPreferences", &())?
                    .body()
                    .deserialize()?;
                println!("Alert preferences reset");
            }
        },
    }

    Ok(())
}
