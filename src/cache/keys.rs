use std::time::Duration;

/// Completed sessions are immutable, so results can cache for a long window.
pub const QUIZ_RESULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Result cache key, scoped by owner so a cache hit can never hand one
/// user's session result to another user.
pub fn quiz_result_key(user_id: &str, session_id: &str) -> String {
    format!("quiz:result:{}:{}", user_id, session_id)
}

#[cfg(test)]
mod tests {
    use super::quiz_result_key;

    #[test]
    fn result_key_is_owner_scoped() {
        let key_a = quiz_result_key("user-a", "session-1");
        let key_b = quiz_result_key("user-b", "session-1");
        assert_ne!(key_a, key_b);
        assert_eq!(key_a, "quiz:result:user-a:session-1");
    }
}
