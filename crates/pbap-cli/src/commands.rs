//! Command handlers for pbapd

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use pbap_core::{ContactId, Timestamp, VersionStore};
use pbap_harness::{contact, FileVersionStore, Harness, StaticTelephony};
use pbap_runtime::{
    AccessPermission, AccessRequestKind, CallerContext, PbapEventSender, PbapQueryHandle,
    ProfileLifecycle, RemoteId, ServiceBuilder, SessionHandle,
};

use crate::cli::{Cli, Commands};
use crate::config::{AppConfig, SimulatorConfig};
use crate::error::{CliError, Result};

const HELP: &str = "\
connect <addr> <session>        remote connects with a new session
allow <addr> [persist]          user accepts the confirmation prompt
deny <addr> [persist]           user rejects the confirmation prompt
cancel <addr>                   prompt dismissed without an answer
disconnect <addr>               disconnect through the query surface
drop <addr>                     transport reports the remote gone
complete <session>              session layer finished the session
key <addr> <key>                auth challenge answered
key-cancel <addr>               auth challenge dismissed
trust <addr> | reject <addr>    store a permission for the remote
add <id> <fields> <service>     add or replace a contact
remove <id>                     delete a contact
change                          contact store changed
rollover                        roll the primary version over
wake                            session layer starts protocol work
accept-failed                   listener reports an accept failure
status                          print the status snapshot as JSON
help | quit";

/// One line of interactive input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCommand {
    Connect {
        remote: RemoteId,
        session: SessionHandle,
    },
    Reply {
        remote: RemoteId,
        granted: bool,
        persist: bool,
    },
    Cancel(RemoteId),
    Disconnect(RemoteId),
    Drop(RemoteId),
    Complete(SessionHandle),
    Key {
        remote: RemoteId,
        key: String,
    },
    KeyCancel(RemoteId),
    Preset {
        remote: RemoteId,
        permission: AccessPermission,
    },
    AddContact {
        id: ContactId,
        fields: u32,
        service_fields: u32,
    },
    RemoveContact(ContactId),
    Change,
    Rollover,
    Wake,
    AcceptFailed,
    Status,
    Help,
    Quit,
}

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<SimCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb, args.as_slice()) {
        ("connect", [addr, session]) => SimCommand::Connect {
            remote: addr.parse()?,
            session: SessionHandle::new(parse_number(session)?),
        },
        ("allow" | "deny", [addr, rest @ ..]) => SimCommand::Reply {
            remote: addr.parse()?,
            granted: verb == "allow",
            persist: matches!(rest, ["persist"]),
        },
        ("cancel", [addr]) => SimCommand::Cancel(addr.parse()?),
        ("disconnect", [addr]) => SimCommand::Disconnect(addr.parse()?),
        ("drop", [addr]) => SimCommand::Drop(addr.parse()?),
        ("complete", [session]) => SimCommand::Complete(SessionHandle::new(parse_number(session)?)),
        ("key", [addr, key]) => SimCommand::Key {
            remote: addr.parse()?,
            key: (*key).to_string(),
        },
        ("key-cancel", [addr]) => SimCommand::KeyCancel(addr.parse()?),
        ("trust", [addr]) => SimCommand::Preset {
            remote: addr.parse()?,
            permission: AccessPermission::Allowed,
        },
        ("reject", [addr]) => SimCommand::Preset {
            remote: addr.parse()?,
            permission: AccessPermission::Rejected,
        },
        ("add", [id, fields, service]) => SimCommand::AddContact {
            id: parse_number(id)?,
            fields: parse_number(fields)?,
            service_fields: parse_number(service)?,
        },
        ("remove", [id]) => SimCommand::RemoveContact(parse_number(id)?),
        ("change", []) => SimCommand::Change,
        ("rollover", []) => SimCommand::Rollover,
        ("wake", []) => SimCommand::Wake,
        ("accept-failed", []) => SimCommand::AcceptFailed,
        ("status", []) => SimCommand::Status,
        ("help", []) => SimCommand::Help,
        ("quit" | "exit", []) => SimCommand::Quit,
        _ => return Err(CliError::Command(format!("{line} (try `help`)"))),
    };
    Ok(Some(command))
}

fn parse_number<T: std::str::FromStr>(raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| CliError::Command(format!("not a number: {raw}")))
}

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command
    pub async fn execute(cli: Cli, config: AppConfig) -> Result<()> {
        match cli.command {
            Commands::Run => Self::handle_run_command(config).await,
            Commands::Status => Self::handle_status_command(&config),
            Commands::ExampleConfig => {
                println!("{}", AppConfig::example_toml()?);
                Ok(())
            }
        }
    }

    /// Run the server against in-memory collaborators until `quit`, EOF or Ctrl+C
    async fn handle_run_command(config: AppConfig) -> Result<()> {
        let harness = Self::simulated_device(&config.simulator);
        let counters_path = config.counters_path()?;
        info!("Persisting version counters to {}", counters_path.display());

        let mut service = ServiceBuilder::new()
            .with_config(config.server.clone())
            .with_permission_store(harness.permissions.clone())
            .with_prompt(harness.prompt.clone())
            .with_sdp_registrar(harness.sdp.clone())
            .with_transport(harness.listener.clone())
            .with_session_layer(harness.sessions.clone())
            .with_wake_locks(harness.wake_locks.clone())
            .with_contact_store(harness.contacts.clone())
            .with_version_store(Arc::new(FileVersionStore::new(counters_path)))
            .with_telephony(harness.telephony.clone())
            .build()?;

        let sender = service.event_sender();
        let queries = service.query_handle();
        let mut notifications = service.subscribe();
        let printer = tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(event) => println!("event: {event:?}"),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} service events", missed),
                    Err(RecvError::Closed) => break,
                }
            }
        });

        service.start().await?;
        println!("Type `help` for the list of commands");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("{}", config.simulator.prompt);
            std::io::stdout().flush()?;

            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    break;
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };

            match parse_command(&line) {
                Ok(None) => {}
                Ok(Some(SimCommand::Quit)) => break,
                Ok(Some(command)) => {
                    if let Err(e) = Self::apply(command, &harness, &sender, &queries).await {
                        println!("error: {e}");
                    }
                }
                Err(e) => println!("error: {e}"),
            }
        }

        info!("Stopping phonebook access server");
        service.stop().await?;
        printer.abort();
        Ok(())
    }

    /// Print the persisted counters without starting the server
    fn handle_status_command(config: &AppConfig) -> Result<()> {
        let store = FileVersionStore::new(config.counters_path()?);
        match store.load()? {
            Some(counters) => println!("{}", serde_json::to_string_pretty(&counters)?),
            None => println!("No version counters at {}", store.path().display()),
        }
        Ok(())
    }

    async fn apply(
        command: SimCommand,
        harness: &Harness,
        sender: &PbapEventSender,
        queries: &PbapQueryHandle,
    ) -> Result<()> {
        match command {
            SimCommand::Connect { remote, session } => {
                sender.notify_connection_accepted(remote, session)?
            }
            SimCommand::Reply {
                remote,
                granted,
                persist,
            } => sender.notify_authorization_reply(
                remote,
                AccessRequestKind::Phonebook,
                granted,
                persist,
            )?,
            SimCommand::Cancel(remote) => sender.notify_authorization_cancelled(remote)?,
            SimCommand::Disconnect(remote) => {
                if !queries
                    .disconnect(&CallerContext::privileged(), remote)
                    .await?
                {
                    println!("{remote} is not connected");
                }
            }
            SimCommand::Drop(remote) => sender.notify_transport_disconnected(remote)?,
            SimCommand::Complete(session) => sender.notify_session_completed(session)?,
            SimCommand::Key { remote, key } => sender.notify_auth_challenge_response(remote, key)?,
            SimCommand::KeyCancel(remote) => sender.notify_auth_challenge_cancelled(remote)?,
            SimCommand::Preset { remote, permission } => {
                harness.permissions.preset(remote, permission)
            }
            SimCommand::AddContact {
                id,
                fields,
                service_fields,
            } => harness.contacts.upsert(contact(
                id,
                Timestamp::now().as_millis(),
                fields,
                service_fields,
            )),
            SimCommand::RemoveContact(id) => {
                if harness.contacts.remove(id).is_none() {
                    println!("No contact {id}");
                }
            }
            SimCommand::Change => sender.notify_contacts_changed()?,
            SimCommand::Rollover => sender.notify_rollover()?,
            SimCommand::Wake => sender.notify_wake_acquire()?,
            SimCommand::AcceptFailed => sender.notify_accept_failed()?,
            SimCommand::Status => {
                println!("{}", serde_json::to_string_pretty(&queries.status())?)
            }
            SimCommand::Help => println!("{HELP}"),
            SimCommand::Quit => {}
        }
        Ok(())
    }

    fn simulated_device(config: &SimulatorConfig) -> Harness {
        let mut telephony = StaticTelephony::new();
        if let Some(number) = &config.phone_number {
            telephony = telephony.with_number(number.clone());
        }
        if let Some(tag) = &config.alpha_tag {
            telephony = telephony.with_alpha_tag(tag.clone());
        }

        let seeded = (1..=u64::from(config.seed_contacts)).map(|id| contact(id, 0, 6, 3));
        Harness::new().with_contacts(seeded).with_telephony(telephony)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> RemoteId {
        RemoteId::new([0x00, 0x1A, 0x7D, 0xDA, 0x71, 0x13])
    }

    #[test]
    fn test_parse_connection_commands() {
        assert_eq!(
            parse_command("connect 00:1A:7D:DA:71:13 7").unwrap(),
            Some(SimCommand::Connect {
                remote: addr(),
                session: SessionHandle::new(7)
            })
        );
        assert_eq!(
            parse_command("allow 00:1A:7D:DA:71:13 persist").unwrap(),
            Some(SimCommand::Reply {
                remote: addr(),
                granted: true,
                persist: true
            })
        );
        assert_eq!(
            parse_command("  deny 001A7DDA7113 ").unwrap(),
            Some(SimCommand::Reply {
                remote: addr(),
                granted: false,
                persist: false
            })
        );
        assert_eq!(
            parse_command("reject 00-1A-7D-DA-71-13").unwrap(),
            Some(SimCommand::Preset {
                remote: addr(),
                permission: AccessPermission::Rejected
            })
        );
    }

    #[test]
    fn test_parse_store_commands() {
        assert_eq!(
            parse_command("add 4 9 2").unwrap(),
            Some(SimCommand::AddContact {
                id: 4,
                fields: 9,
                service_fields: 2
            })
        );
        assert_eq!(parse_command("rollover").unwrap(), Some(SimCommand::Rollover));
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("exit").unwrap(), Some(SimCommand::Quit));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(
            parse_command("connect 00:1A:7D:DA:71:13"),
            Err(CliError::Command(_))
        ));
        assert!(matches!(
            parse_command("complete seven"),
            Err(CliError::Command(_))
        ));
        assert!(matches!(
            parse_command("cancel 00:1A:7D"),
            Err(CliError::Pbap(_))
        ));
        assert!(parse_command("frobnicate").is_err());
    }

    #[test]
    fn test_simulated_device_seeds_contacts() {
        let config = SimulatorConfig {
            seed_contacts: 5,
            alpha_tag: Some("Bench".to_string()),
            ..SimulatorConfig::default()
        };
        let harness = CommandDispatcher::simulated_device(&config);
        assert_eq!(harness.contacts.len(), 5);
    }
}
