/// Append-only turn log. `context` and `config` hold JSON text.
pub const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        content TEXT NOT NULL,
        role TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
        timestamp TEXT NOT NULL,
        audio_url TEXT,
        model TEXT,
        context TEXT,
        config TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages (timestamp);
";
