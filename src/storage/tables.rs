use redb::TableDefinition;

/// Users: username -> User (msgpack)
pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Secondary index: user id -> username
pub const USER_IDS: TableDefinition<u64, &str> = TableDefinition::new("user_ids");

/// Sessions: bearer token -> Session (msgpack)
pub const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
