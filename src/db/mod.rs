pub mod schema;

use crate::config::Config;
use crate::models::{Message, MessageContext, ModelConfig, NewMessage};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    default_model: String,
}

/// Column values exactly as SQLite returns them.
struct MessageRow {
    id: i64,
    content: String,
    role: String,
    timestamp: String,
    audio_url: Option<String>,
    model: Option<String>,
    context: Option<String>,
    config: Option<String>,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> anyhow::Result<Self> {
        let context = row
            .context
            .as_deref()
            .map(serde_json::from_str::<MessageContext>)
            .transpose()?;
        let config = row
            .config
            .as_deref()
            .map(serde_json::from_str::<ModelConfig>)
            .transpose()?;

        Ok(Message {
            id: row.id,
            content: row.content,
            role: row.role.parse()?,
            timestamp: DateTime::parse_from_rfc3339(&row.timestamp)?.with_timezone(&Utc),
            audio_url: row.audio_url,
            model: row.model,
            context,
            config,
        })
    }
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if config.database_url != ":memory:" {
            if let Some(parent) = Path::new(&config.database_url).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }
        let conn = Connection::open(&config.database_url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_model: config.default_model.clone(),
        })
    }

    fn conn(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database connection lock poisoned"))
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let conn = self.conn()?;
        conn.execute_batch(schema::SCHEMA)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a synchronous store operation off the async executor.
    pub async fn run_blocking<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    /// All stored turns, oldest first.
    pub fn list_messages(&self) -> anyhow::Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, role, timestamp, audio_url, model, context, config
             FROM messages ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                content: row.get(1)?,
                role: row.get(2)?,
                timestamp: row.get(3)?,
                audio_url: row.get(4)?,
                model: row.get(5)?,
                context: row.get(6)?,
                config: row.get(7)?,
            })
        })?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(Message::try_from(row?)?);
        }
        debug!("Database: Loaded {} messages", messages.len());
        Ok(messages)
    }

    /// Appends a turn and returns it with its assigned id and timestamp.
    pub fn add_message(&self, message: NewMessage) -> anyhow::Result<Message> {
        let timestamp = Utc::now();
        let model = message
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());
        let context = message
            .context
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let config = message
            .config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO messages (content, role, timestamp, audio_url, model, context, config)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                &message.content,
                message.role.as_str(),
                timestamp.to_rfc3339(),
                &message.audio_url,
                &model,
                &context,
                &config,
            ),
        )?;
        let id = conn.last_insert_rowid();
        debug!("Database: Stored {} message {} (model {})", message.role, id, model);

        Ok(Message {
            id,
            content: message.content,
            role: message.role,
            timestamp,
            audio_url: message.audio_url,
            model: Some(model),
            context: message.context,
            config: message.config,
        })
    }

    /// Deletes every stored turn. Returns the number of rows removed.
    pub fn clear_messages(&self) -> anyhow::Result<usize> {
        let conn = self.conn()?;
        let count = conn.execute("DELETE FROM messages", [])?;
        info!("Database: Cleared {} messages", count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::models::Role;

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_db_init_and_save() {
        let db = test_db();

        let stored = db
            .add_message(NewMessage::new(Role::User, "hello"))
            .unwrap();
        assert_eq!(stored.content, "hello");
        assert_eq!(stored.model.as_deref(), Some("gemini-1.5-pro"));
        assert!(stored.context.is_none());

        let all = db.list_messages().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], stored);
    }

    #[test]
    fn test_ids_increase_in_insertion_order() {
        let db = test_db();
        let a = db.add_message(NewMessage::new(Role::User, "a")).unwrap();
        let b = db.add_message(NewMessage::new(Role::Assistant, "b")).unwrap();
        let c = db.add_message(NewMessage::new(Role::User, "c")).unwrap();
        assert!(a.id < b.id && b.id < c.id);

        let contents: Vec<_> = db
            .list_messages()
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_context_and_config_persisted() {
        let db = test_db();
        let context = MessageContext {
            summary: "talked about trails".to_string(),
            relevant_ids: vec![1],
            importance: 1.0,
            topics: vec!["hiking".to_string()],
        };
        db.add_message(
            NewMessage::new(Role::User, "trails?")
                .with_model("gemini-1.5-flash")
                .with_context(context.clone())
                .with_config(ModelConfig::default())
                .with_audio_url(Some("blob:abc".to_string())),
        )
        .unwrap();

        let loaded = db.list_messages().unwrap().remove(0);
        assert_eq!(loaded.context, Some(context));
        assert_eq!(loaded.config, Some(ModelConfig::default()));
        assert_eq!(loaded.model.as_deref(), Some("gemini-1.5-flash"));
        assert_eq!(loaded.audio_url.as_deref(), Some("blob:abc"));
    }

    #[test]
    fn test_clear_does_not_reuse_ids() {
        let db = test_db();
        db.add_message(NewMessage::new(Role::User, "one")).unwrap();
        let second = db.add_message(NewMessage::new(Role::User, "two")).unwrap();

        assert_eq!(db.clear_messages().unwrap(), 2);
        assert!(db.list_messages().unwrap().is_empty());

        let third = db.add_message(NewMessage::new(Role::User, "three")).unwrap();
        assert!(third.id > second.id);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let db = test_db();
        let conn = db.conn().unwrap();
        let result = conn.execute(
            "INSERT INTO messages (content, role, timestamp) VALUES ('x', 'system', '2026-01-01T00:00:00Z')",
            [],
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_run_blocking() {
        let db = test_db();
        let stored = db
            .run_blocking(|db| db.add_message(NewMessage::new(Role::User, "async")))
            .await
            .unwrap();
        let listed = db.run_blocking(|db| db.list_messages()).await.unwrap();
        assert_eq!(listed, vec![stored]);
    }
}
