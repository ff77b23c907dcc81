pub mod agent;
pub mod auth;
pub mod data;
pub mod health;

pub use agent::{agent_query, agent_schema};
pub use auth::{
    delete_user, delete_user_by_email, logout, register_initiate, register_status,
    register_verify, session_history, signin, verify_session,
};
pub use data::{delete_table_data, get_table_data, list_user_tables, summarize_data, upload_file};
pub use health::health_check;
