pub mod device_map_queries;
pub mod history_queries;
pub mod live_state_queries;
