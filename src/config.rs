use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_conn_string: String,
    pub mongo_db_name: String,
    pub tests_collection: String,
    pub submissions_collection: String,
    pub default_batch_size: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_conn_string: env::var("MONGO_CONN_STRING")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db_name: env::var("MONGO_DB_NAME")
                .unwrap_or_else(|_| "exam-platform".to_string()),
            tests_collection: env::var("TESTS_COLLECTION").unwrap_or_else(|_| "tests".to_string()),
            submissions_collection: env::var("SUBMISSIONS_COLLECTION")
                .unwrap_or_else(|_| "submissions".to_string()),
            default_batch_size: env::var("RECONCILE_BATCH_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            mongo_conn_string: "mongodb://localhost:27017".to_string(),
            mongo_db_name: "exam-platform-test".to_string(),
            tests_collection: "tests".to_string(),
            submissions_collection: "submissions".to_string(),
            default_batch_size: 50,
        }
    }
}
