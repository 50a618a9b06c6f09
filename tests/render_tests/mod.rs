mod cache_test;
mod scenario_test;

use lowcoder_runtime::engine::RenderNode;
use lowcoder_runtime::Schema;

pub fn parse_schema(json: &str) -> Schema {
    Schema::from_json(json).expect("schema fixture should parse")
}

pub fn ids(nodes: &[RenderNode]) -> Vec<&str> {
    nodes.iter().map(|node| node.id.as_str()).collect()
}
