//! Ring inspection: walk the successors once, collecting each peer's
//! summary, until the walk comes back around to where it started.

use ringstore_sdk::message::{OverlayReply, PeerSummary, Request};

use super::Node;

impl Node {
    pub async fn overlay(&self, start_node_id: Option<u64>) -> Vec<PeerSummary> {
        let start = start_node_id.unwrap_or_else(|| self.id());
        let (summary, succ) = self.with_state(|st| {
            (
                PeerSummary {
                    node_id: self.id(),
                    successor: st.successor.clone(),
                    predecessor: st.predecessor.clone(),
                    data_store: st.store.clone(),
                    uploaded_keys: st.uploaded_keys.clone(),
                },
                st.successor.clone(),
            )
        });

        let mut overlay = vec![summary];
        if succ.id == start {
            return overlay;
        }
        if let Some(reply) = self
            .call_peer::<OverlayReply>(&succ, &Request::GetOverlay { start_node_id: Some(start) })
            .await
        {
            overlay.extend(reply.overlay);
        }
        overlay
    }
}
