use std::collections::HashMap;

/// Hands out globally unique node ids and connection innovation numbers, and de-duplicates
/// structurally identical mutations that occur within the same generation (§4.1).
///
/// The two counters are monotonic for the whole run and are persisted; the two caches are
/// per-generation and are rebuilt from scratch by [`InnovationRegistry::reset_generation_cache`].
#[derive(Debug, Clone)]
pub struct InnovationRegistry {
    next_node_id: usize,
    next_innovation: usize,
    connection_cache: HashMap<(usize, usize), usize>,
    split_cache: HashMap<usize, (usize, usize, usize)>,
}

impl InnovationRegistry {
    /// `start_node_id` and `start_innovation` seed the counters; used both for a fresh run
    /// (where they cover the initial input/bias/output nodes and initial connections already
    /// allocated by the caller) and when restoring from a save image.
    pub fn new(start_node_id: usize, start_innovation: usize) -> Self {
        InnovationRegistry {
            next_node_id: start_node_id,
            next_innovation: start_innovation,
            connection_cache: HashMap::new(),
            split_cache: HashMap::new(),
        }
    }

    pub fn new_node_id(&mut self) -> usize {
        let id = self.next_node_id;
        self.next_node_id += 1;
        id
    }

    /// Returns the innovation already allocated to `(src, dst)` this generation, or allocates
    /// and caches a fresh one.
    pub fn connection_innovation(&mut self, src: usize, dst: usize) -> usize {
        if let Some(&innov) = self.connection_cache.get(&(src, dst)) {
            return innov;
        }
        let innov = self.next_innovation;
        self.next_innovation += 1;
        self.connection_cache.insert((src, dst), innov);
        innov
    }

    /// Returns the (new-node-id, inbound-innovation, outbound-innovation) triple already
    /// allocated for splitting `conn_innovation` this generation, or allocates a fresh node
    /// and two fresh connection innovations via [`connection_innovation`].
    pub fn register_node_split(
        &mut self,
        conn_innovation: usize,
        src: usize,
        dst: usize,
    ) -> (usize, usize, usize) {
        if let Some(&triple) = self.split_cache.get(&conn_innovation) {
            return triple;
        }
        let new_node = self.new_node_id();
        let inbound = self.connection_innovation(src, new_node);
        let outbound = self.connection_innovation(new_node, dst);
        let triple = (new_node, inbound, outbound);
        self.split_cache.insert(conn_innovation, triple);
        triple
    }

    /// Called exactly once at the start of every generation (§4.1, §4.8 step 1).
    pub fn reset_generation_cache(&mut self) {
        self.connection_cache.clear();
        self.split_cache.clear();
    }

    pub fn node_id_counter(&self) -> usize {
        self.next_node_id
    }

    pub fn innovation_counter(&self) -> usize {
        self.next_innovation
    }

    /// Used only when restoring counters from a save image; the per-generation caches are
    /// never persisted and always start empty.
    pub fn restore_counters(&mut self, next_node_id: usize, next_innovation: usize) {
        self.next_node_id = next_node_id;
        self.next_innovation = next_innovation;
        self.connection_cache.clear();
        self.split_cache.clear();
    }
}
