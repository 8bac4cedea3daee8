use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Todo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewTodo {
    pub title: String,
}

impl NewTodo {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into() }
    }
}

/// Rows inserted into an empty table the first time the todo page loads.
pub fn sample_todos() -> Vec<NewTodo> {
    vec![
        NewTodo::new("Finish the project integration"),
        NewTodo::new("Test the todo app"),
        NewTodo::new("Polish the user experience"),
    ]
}
