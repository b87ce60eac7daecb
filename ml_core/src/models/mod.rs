mod graph_conv;
mod linear;

pub use graph_conv::GraphConv;
pub use linear::Linear;
