use tether::{SessionController, SessionEvent, Value};

fn json(value: &impl serde::Serialize) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!("<{e}>"))
}

fn property_json(session: &SessionController, id: i32, name: &str) -> String {
    session
        .entity(id)
        .and_then(|entity| entity.property(name))
        .map_or_else(|| "null".to_string(), |value: &Value| json(value))
}

pub fn log_event(session: &SessionController, event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged { from, to } => log::debug!("State {from} -> {to}"),
        SessionEvent::HelloAccepted {
            tier,
            server_version,
            server_script_version,
            digest,
        } => log::info!(
            "{tier} tier: server {server_version} scripts {server_script_version}, digest {}",
            json(digest)
        ),
        SessionEvent::SchemaImported { tier } => log::info!("Imported {tier} schema"),
        SessionEvent::SchemaReused { digest } => log::info!("Reusing cached schema {}", json(digest)),
        SessionEvent::LoginSucceeded { account, gameplay } => {
            log::info!("Logged in as {account}, gameplay tier {gameplay}")
        }
        SessionEvent::AccountCreated {
            code, description, ..
        } => log::info!("Account creation result {code}: {description}"),
        SessionEvent::PasswordResetRequested { code, description } => {
            log::info!("Password reset result {code}: {description}")
        }
        SessionEvent::EnteredWorld {
            player,
            entity_type,
            relogin,
        } => {
            let how = if *relogin { "re-entered" } else { "entered" };
            log::info!("Player {player} ({entity_type}) {how} the world");
        }
        SessionEvent::EntityCreated { id, entity_type } => {
            log::info!("Entity {id} ({entity_type}) created")
        }
        SessionEvent::EntityUpdated { id, properties } => {
            for name in properties {
                log::info!("Entity {id} {name} = {}", property_json(session, *id, name));
            }
        }
        SessionEvent::EntityDestroyed { id, entity_type } => {
            log::info!("Entity {id} ({entity_type}) destroyed")
        }
        SessionEvent::EntityMethod(call) => {
            log::info!("Entity {} called {}({})", call.entity, call.method, json(&call.args))
        }
        SessionEvent::PlayerDestroyed { id } => log::warn!("Player {id} destroyed by the server"),
        SessionEvent::SpaceDataChanged { space_id, key } => match key {
            Some(key) => log::info!(
                "Space {space_id} {key} = {}",
                json(&session.space_data(key))
            ),
            None => log::info!("Space {space_id} data initialized"),
        },
        SessionEvent::Failed(err) => log::error!("Session failed: {err}"),
    }
}
