use std::sync::Arc;

use campusnest_db::Database;
use campusnest_gateway::ConnectionRegistry;

use crate::messages::MessageService;
use crate::notifications::Notifier;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub registry: ConnectionRegistry,
    pub messages: Arc<MessageService>,
    pub notifier: Notifier,
}

impl AppStateInner {
    /// Wire the services around one database and one registry.
    pub fn new(
        db: Database,
        jwt_secret: String,
        token_ttl: chrono::Duration,
        registry: ConnectionRegistry,
    ) -> AppState {
        let db = Arc::new(db);
        Arc::new(Self {
            messages: Arc::new(MessageService::new(db.clone(), registry.clone())),
            notifier: Notifier::new(db.clone(), registry.clone()),
            db,
            jwt_secret,
            token_ttl,
            registry,
        })
    }
}
