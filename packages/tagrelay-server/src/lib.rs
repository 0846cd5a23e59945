pub mod agent;
pub mod feed;
pub mod router;
pub mod server;

pub use agent::{capabilities, detect_platform};
pub use feed::render_atom;
pub use router::{query_param, Route};
pub use server::{GatewayServer, GatewayService};
