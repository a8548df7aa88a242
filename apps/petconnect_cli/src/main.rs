use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input};
use petconnect_adapters::{
    build_api_client, configuration, open_credential_store, telemetry, WsChatConnection,
};
use petconnect_core::chat::{SocketEvent, TypingIndicator, TypingNotifier};
use petconnect_core::entities::{
    Credentials, NextCard, ProfileKind, Registration, SwipeAction, UserRecord, UserRole,
};
use petconnect_core::ports::ChatConnection;
use petconnect_core::use_cases::{
    ChatUseCase, PetMatchUseCase, Profile, ProfilesUseCase, SessionUseCase,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    // --- Session commands ---
    /// Sign in and store the session
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Create an account and sign in with it
    Register {
        #[arg(short, long)]
        username: Option<String>,

        #[arg(short, long)]
        email: Option<String>,

        #[arg(long)]
        city: Option<String>,

        /// Register as an animal shelter
        #[arg(long, default_value = "false")]
        shelter: bool,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in account
    Whoami {
        /// Only print the cached record, without asking the server
        #[arg(long, default_value = "false")]
        offline: bool,
    },

    /// Show or edit your profile
    Profile {
        /// Profile to update (required with --set)
        #[arg(long)]
        id: Option<u64>,

        /// Field to update, as name=value. Values that parse as JSON are sent as JSON.
        #[arg(long = "set", value_name = "NAME=VALUE")]
        fields: Vec<String>,
    },

    // --- Match commands ---
    /// Show the next pet to swipe
    Next,

    /// Like (or dislike) a pet
    Swipe {
        pet_id: u64,

        #[arg(long, default_value = "false")]
        dislike: bool,
    },

    /// List liked pets
    Favorites,

    // --- Chat commands ---
    /// List your chats
    Chats,

    /// Print the messages of a chat
    Messages { chat_id: u64 },

    /// Send a message to a chat
    Send { chat_id: u64, message: String },

    /// Follow a chat live; lines typed on stdin are sent as messages
    Watch { chat_id: u64 },
}

fn profile_kind(user: &UserRecord) -> ProfileKind {
    if user.is_shelter() {
        ProfileKind::Shelter
    } else {
        ProfileKind::Adopter
    }
}

fn parse_fields(raw: &[String]) -> anyhow::Result<Profile> {
    let mut fields = Profile::new();
    for entry in raw {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got '{}'", entry))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

/// Relay a typing change decided by the notifier; failures only get logged.
async fn relay_typing(
    chats: &ChatUseCase,
    connection: &dyn ChatConnection,
    user: &UserRecord,
    update: Option<bool>,
) {
    let Some(is_typing) = update else { return };
    if let Err(e) = chats.announce_typing(connection, user, is_typing).await {
        error!(?e, is_typing, "failed to announce typing");
    }
}

fn prompt_if_missing(value: &Option<String>, prompt: &str) -> anyhow::Result<String> {
    match value {
        Some(v) => Ok(v.clone()),
        None => Ok(Input::new().with_prompt(prompt).interact_text()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = match configuration::get_configuration() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("failed to load configuration: {}", e);
            return Err(anyhow::anyhow!("configuration loading failed"));
        }
    };

    let _guard = telemetry::init_subscriber("petconnect_cli", &settings.log_level)?;

    let cli = Cli::parse();

    let store = open_credential_store(&settings.storage).await?;
    let api = Arc::new(build_api_client(&settings.api, store.clone())?);
    let session = SessionUseCase::new(api.clone(), store);

    match &cli.command {
        // --- Session commands ---
        Commands::Login { username } => {
            let username = prompt_if_missing(username, "Username")?;
            let password = rpassword::prompt_password("Password: ")?;

            match session.login(&Credentials::new(username, password)).await {
                Ok(user) => println!("Logged in as {} ({})", user.username, user.role),
                Err(e) => {
                    error!(?e, "login failed");
                    println!("Login failed: {}", e.detail().unwrap_or_else(|| e.to_string()));
                }
            }
        }
        Commands::Register {
            username,
            email,
            city,
            shelter,
        } => {
            let registration = Registration {
                username: prompt_if_missing(username, "Username")?,
                email: prompt_if_missing(email, "Email")?,
                password: rpassword::prompt_password("Password: ")?,
                role: if *shelter {
                    UserRole::Protectora
                } else {
                    UserRole::Usuario
                },
                city: city.clone(),
            };

            let user = session.register(&registration).await?;
            println!("Welcome, {}! You are signed in as {}.", user.username, user.role);
        }
        Commands::Logout => {
            let confirmed = Confirm::new()
                .with_prompt("Sign out?")
                .default(true)
                .interact()?;

            if !confirmed {
                println!("Cancelled.");
                return Ok(());
            }

            session.logout().await?;
            println!("Signed out.");
        }
        Commands::Whoami { offline } => {
            let user = if *offline {
                session.cached_user().await?
            } else {
                session.current_user().await?
            };

            match user {
                Some(user) => {
                    println!("{} (id {})", user.username, user.id);
                    println!("- Role: {}", user.role);
                    if let Some(email) = &user.email {
                        println!("- Email: {}", email);
                    }
                }
                None => println!("Not signed in."),
            }
        }
        Commands::Profile { id, fields } => {
            let user = session.require_user().await?;
            let profiles = ProfilesUseCase::new(api.clone());
            let kind = profile_kind(&user);

            if fields.is_empty() {
                for profile in profiles.list(kind).await? {
                    println!("{}", serde_json::to_string_pretty(&profile)?);
                }
            } else {
                let id = id.ok_or_else(|| anyhow::anyhow!("--id is required with --set"))?;
                let updated = profiles.update(kind, id, &parse_fields(fields)?).await?;
                println!("{}", serde_json::to_string_pretty(&updated)?);
            }
        }

        // --- Match commands ---
        Commands::Next => {
            let pets = PetMatchUseCase::new(api.clone());
            match pets.next_card().await? {
                NextCard::Card(pet) => {
                    println!("[{}] {}", pet.id, pet.name);
                    for (label, value) in [
                        ("Species", &pet.species),
                        ("Sex", &pet.sex),
                        ("Size", &pet.size),
                        ("Age", &pet.age),
                        ("Shelter", &pet.shelter_name),
                        ("City", &pet.shelter_city),
                    ] {
                        if let Some(value) = value {
                            println!("- {}: {}", label, value);
                        }
                    }
                    if let Some(description) = &pet.description {
                        println!();
                        println!("{}", description);
                    }
                }
                NextCard::Exhausted { message } => println!("{}", message),
            }
        }
        Commands::Swipe { pet_id, dislike } => {
            let pets = PetMatchUseCase::new(api.clone());
            let action = if *dislike {
                SwipeAction::Dislike
            } else {
                SwipeAction::Like
            };

            let outcome = pets.swipe(*pet_id, action).await?;
            if let Some(message) = &outcome.message {
                println!("{}", message);
            }
            if let Some(chat_id) = outcome.chat_id {
                println!("Chat with the shelter: {} (petconnect watch {})", chat_id, chat_id);
            }
        }
        Commands::Favorites => {
            let pets = PetMatchUseCase::new(api.clone());
            let ids = pets.favorites().await?;
            if ids.is_empty() {
                println!("No favorites yet.");
            }
            for id in ids {
                match pets.pet(id).await {
                    Ok(pet) => println!("[{}] {}", pet.id, pet.name),
                    Err(e) => {
                        error!(?e, pet_id = id, "failed to load pet");
                        println!("[{}] (unavailable)", id);
                    }
                }
            }
        }

        // --- Chat commands ---
        Commands::Chats => {
            let user = session.require_user().await?;
            let chats = ChatUseCase::new(api.clone()).list_chats().await?;
            if chats.is_empty() {
                println!("No chats yet.");
            }
            for chat in chats {
                println!(
                    "[{}] {} with {} ({} unread)",
                    chat.id,
                    chat.pet_name.as_deref().unwrap_or("?"),
                    chat.counterpart(&user.username).unwrap_or("?"),
                    chat.unread_count
                );
                if let Some(last) = &chat.last_message {
                    println!("    {}: {}", last.sender, last.content);
                }
            }
        }
        Commands::Messages { chat_id } => {
            let chat = ChatUseCase::new(api.clone()).open(*chat_id).await?;
            for message in chat.timeline.messages() {
                println!(
                    "{} {}: {}",
                    message.sent_at.format("%Y-%m-%d %H:%M"),
                    message.sender,
                    message.content
                );
            }
        }
        Commands::Send { chat_id, message } => {
            let user = session.require_user().await?;
            let chats = ChatUseCase::new(api.clone());
            let mut chat = chats.open(*chat_id).await?;

            // Relay is best effort; the API call is what stores the message
            let connection = match WsChatConnection::connect(&settings.api).await {
                Ok(connection) => {
                    chats.join(&connection, &user, *chat_id).await?;
                    Some(connection)
                }
                Err(e) => {
                    error!(?e, "chat relay unavailable");
                    None
                }
            };

            let stored = chats
                .send_message(
                    &mut chat.timeline,
                    &user,
                    message,
                    connection.as_ref().map(|c| c as &dyn ChatConnection),
                )
                .await?;
            println!("Sent (#{})", stored.id);

            if let Some(connection) = connection {
                connection.close().await?;
            }
        }
        Commands::Watch { chat_id } => {
            let user = session.require_user().await?;
            let chats = ChatUseCase::new(api.clone());
            let mut chat = chats.open(*chat_id).await?;

            for message in chat.timeline.messages() {
                println!("{}: {}", message.sender, message.content);
            }

            let connection = WsChatConnection::connect(&settings.api).await?;
            chats.join(&connection, &user, *chat_id).await?;
            println!("-- live, type a message and press enter (ctrl-c to quit) --");

            let mut typing = TypingIndicator::default();
            let mut notifier = TypingNotifier::default();
            let mut lines = BufReader::new(tokio::io::stdin()).lines();

            loop {
                let idle_at = notifier.deadline();
                let idle_sleep = tokio::time::sleep_until(tokio::time::Instant::from_std(
                    idle_at.unwrap_or_else(Instant::now),
                ));

                tokio::select! {
                    event = connection.recv() => {
                        let Some(event) = event? else {
                            println!("-- relay closed the connection --");
                            break;
                        };
                        let was_typing = typing.is_active(Instant::now());
                        typing.apply_event(&event, Instant::now());
                        if let SocketEvent::Message { .. } = event {
                            if let Some(message) = chat.timeline.apply_event(&event, chrono::Utc::now()) {
                                println!("{}: {}", message.sender, message.content);
                            }
                        } else if let Some(who) = typing.typing_user(Instant::now()) {
                            if !was_typing {
                                println!("({} is typing...)", who);
                            }
                        }
                    }
                    line = lines.next_line() => {
                        let Some(line) = line? else { break };
                        if line.trim().is_empty() {
                            continue;
                        }
                        let update = notifier.keystroke(Instant::now());
                        relay_typing(&chats, &connection, &user, update).await;
                        match chats
                            .send_message(&mut chat.timeline, &user, &line, Some(&connection))
                            .await
                        {
                            Ok(_) => {}
                            Err(e) => println!("Failed to send: {}", e),
                        }
                    }
                    _ = idle_sleep, if idle_at.is_some() => {
                        let update = notifier.poll(Instant::now());
                        relay_typing(&chats, &connection, &user, update).await;
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            connection.close().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use petconnect_adapters::MemoryCredentialStore;
    use petconnect_core::chat::SocketFrame;
    use petconnect_core::config::ApiSettings;
    use petconnect_core::Error;
    use serde_json::json;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingConnection {
        frames: std::sync::Mutex<Vec<SocketFrame>>,
    }

    #[async_trait]
    impl ChatConnection for RecordingConnection {
        async fn send(&self, frame: &SocketFrame) -> Result<(), Error> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<SocketEvent>, Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn test_parse_fields() {
        let fields = parse_fields(&[
            "ciudad=Lleida".to_string(),
            "servicios=[\"acollida\"]".to_string(),
            "telefono=600000000".to_string(),
        ])
        .unwrap();

        assert_eq!(fields.get("ciudad"), Some(&json!("Lleida")));
        assert_eq!(fields.get("servicios"), Some(&json!(["acollida"])));
        assert_eq!(fields.get("telefono"), Some(&json!(600000000)));
    }

    #[test]
    fn test_parse_fields_rejects_missing_value() {
        assert!(parse_fields(&["ciudad".to_string()]).is_err());
    }

    #[test]
    fn test_cli_parses_swipe() {
        let cli = Cli::try_parse_from(["petconnect", "swipe", "12", "--dislike"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Swipe {
                pet_id: 12,
                dislike: true
            }
        ));
    }

    #[tokio::test]
    async fn test_typed_line_announces_typing_then_idle() {
        let store = Arc::new(MemoryCredentialStore::new());
        let api = Arc::new(build_api_client(&ApiSettings::default(), store).unwrap());
        let chats = ChatUseCase::new(api);
        let connection = RecordingConnection::default();
        let user: UserRecord =
            serde_json::from_value(json!({"id": 7, "username": "anna"})).unwrap();

        let mut notifier = TypingNotifier::default();
        let start = Instant::now();
        for update in [
            notifier.keystroke(start),
            notifier.keystroke(start + Duration::from_millis(200)),
            notifier.poll(start + Duration::from_millis(700)),
            notifier.poll(start + Duration::from_millis(1200)),
        ] {
            relay_typing(&chats, &connection, &user, update).await;
        }

        let announced: Vec<_> = connection
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| match frame {
                SocketFrame::Typing { is_typing, .. } => *is_typing,
                other => panic!("unexpected frame: {:?}", other),
            })
            .collect();
        assert_eq!(announced, [true, false]);
    }
}
