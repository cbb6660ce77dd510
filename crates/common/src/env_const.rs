use std::time::Duration;

use rule_env::{EnvError, Environment};

pub const RULES_LOG: &str = "RULES_LOG";

pub const RULES_SUPERUSER_COLLECTION: &str = "RULES_SUPERUSER_COLLECTION";
pub const DEFAULT_SUPERUSER_COLLECTION: &str = "_superusers";

pub const RULES_EVAL_TIMEOUT_MS: &str = "RULES_EVAL_TIMEOUT_MS";
pub const RULES_LIST_PUSHDOWN: &str = "RULES_LIST_PUSHDOWN";

pub fn get_superuser_collection(env: &dyn Environment) -> String {
    env.get_or_else(RULES_SUPERUSER_COLLECTION, DEFAULT_SUPERUSER_COLLECTION)
}

/// The default evaluation deadline. Unset means evaluations run to completion.
pub fn get_eval_timeout(env: &dyn Environment) -> Result<Option<Duration>, EnvError> {
    Ok(env.get_u64(RULES_EVAL_TIMEOUT_MS)?.map(Duration::from_millis))
}

pub fn is_list_pushdown_enabled(env: &dyn Environment) -> Result<bool, EnvError> {
    env.enabled(RULES_LIST_PUSHDOWN, true)
}
