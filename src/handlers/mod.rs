pub mod agent_handlers;
pub mod dashboard_handlers;

pub use agent_handlers::{
    create_agent_handler, get_agent_handler, list_agents_handler, running_agents_handler,
    start_agent_handler, stop_agent_handler,
};
pub use dashboard_handlers::{agent_table_handler, dashboard_handler};
