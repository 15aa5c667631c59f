pub mod handlers;
pub mod server;
pub mod websocket;

pub use handlers::{HealthResponse, OpportunitiesResponse, OpportunityView};
pub use server::{ApiServer, AppState};
