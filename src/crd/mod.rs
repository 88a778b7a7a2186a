mod bridge_cluster;
mod bridge_team;

pub use bridge_cluster::*;
pub use bridge_team::*;
