use invoke_common::{GraphExecutionState, ImageMetadata};

/// Derives the metadata stored alongside an image produced by a node.
pub trait MetadataService: Send + Sync {
    fn create_image_metadata(&self, session: &GraphExecutionState, node_id: &str) -> ImageMetadata;
}

/// Records the producing invocation and the whole graph.
pub struct CoreMetadataService;

impl MetadataService for CoreMetadataService {
    fn create_image_metadata(&self, session: &GraphExecutionState, node_id: &str) -> ImageMetadata {
        let metadata = session
            .graph
            .node(node_id)
            .map(|node| node.invocation.clone());
        let graph = serde_json::to_value(&session.graph).ok();
        ImageMetadata { metadata, graph }
    }
}
