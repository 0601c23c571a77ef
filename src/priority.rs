use crate::tokens::token_enum;

token_enum! {
    /// Priority levels shared by tasks and messages.
    /// Later variants order higher.
    pub enum Priority ("priority") {
        Low => "low",
        Normal => "normal",
        High => "high",
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}
