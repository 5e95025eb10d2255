//! Stores the prerequisite relationships between core loops.
//!
//! A prerequisite edge states that one core loop must be sufficiently mastered before studying
//! another. The relation must stay acyclic globally: a write that would introduce a cycle is
//! rejected and leaves the graph unchanged. The edges are persisted to the database and mirrored
//! in an in-memory adjacency map so that the closure queries used by the selector and the advisor
//! never touch the database.

use anyhow::Result;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::collections::VecDeque;
use tracing::debug;
use ustr::{Ustr, UstrMap, UstrSet};

use crate::error::GraphError;

/// An interface to store and query the prerequisite relation over core loops.
pub trait PrerequisiteGraph: Send + Sync {
    /// Adds an edge stating that `prereq_id` must be mastered before `dependent_id`. Rejected if
    /// the edge would introduce a cycle. Adding an existing edge has no effect.
    fn add_edge(&mut self, prereq_id: Ustr, dependent_id: Ustr) -> Result<(), GraphError>;

    /// Returns the transitive prerequisites of the given core loop.
    fn prereqs_of(&self, core_loop_id: Ustr) -> UstrSet;

    /// Returns the direct prerequisites of the given core loop.
    fn direct_prereqs_of(&self, core_loop_id: Ustr) -> UstrSet;

    /// Returns the transitive dependents of the given core loop.
    fn dependents_of(&self, core_loop_id: Ustr) -> UstrSet;
}

/// Walks the given adjacency map from a starting node and returns every reachable node.
fn reachable(adjacency: &UstrMap<UstrSet>, start: Ustr) -> UstrSet {
    let mut visited = UstrSet::default();
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        if let Some(neighbors) = adjacency.get(&current) {
            for neighbor in neighbors {
                if visited.insert(*neighbor) {
                    queue.push_back(*neighbor);
                }
            }
        }
    }
    visited
}

/// An implementation of [`PrerequisiteGraph`] backed by `SQLite` with an in-memory mirror of the
/// edges.
pub struct LocalPrerequisiteGraph {
    /// A pool of connections to the database.
    pool: Pool<SqliteConnectionManager>,

    /// The mapping of a core loop to its direct prerequisites.
    prereq_map: UstrMap<UstrSet>,

    /// The mapping of a core loop to its direct dependents.
    dependent_map: UstrMap<UstrSet>,
}

impl LocalPrerequisiteGraph {
    /// Creates a new graph sharing the given connection pool, loading any previously stored
    /// edges into memory.
    pub fn new(pool: Pool<SqliteConnectionManager>) -> Result<Self, GraphError> {
        let mut graph = Self {
            pool,
            prereq_map: UstrMap::default(),
            dependent_map: UstrMap::default(),
        };
        graph.load_edges().map_err(GraphError::Storage)?;
        Ok(graph)
    }

    /// Loads all the stored edges into the in-memory adjacency maps.
    fn load_edges(&mut self) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "SELECT prereq_core_loop_id, dependent_core_loop_id FROM prerequisite_edges;",
        )?;
        let edges = stmt
            .query_map(params![], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (prereq, dependent) in edges {
            let prereq = Ustr::from(&prereq);
            let dependent = Ustr::from(&dependent);
            self.insert_edge(prereq, dependent);
        }
        Ok(())
    }

    /// Inserts an edge into the in-memory maps.
    fn insert_edge(&mut self, prereq_id: Ustr, dependent_id: Ustr) {
        self.prereq_map
            .entry(dependent_id)
            .or_default()
            .insert(prereq_id);
        self.dependent_map
            .entry(prereq_id)
            .or_default()
            .insert(dependent_id);
    }

    /// Helper to persist an edge.
    fn store_edge(&mut self, prereq_id: Ustr, dependent_id: Ustr) -> Result<()> {
        let connection = self.pool.get()?;
        let mut stmt = connection.prepare_cached(
            "INSERT OR IGNORE INTO prerequisite_edges
                (prereq_core_loop_id, dependent_core_loop_id) VALUES (?1, ?2);",
        )?;
        stmt.execute(params![prereq_id.as_str(), dependent_id.as_str()])?;
        Ok(())
    }
}

impl PrerequisiteGraph for LocalPrerequisiteGraph {
    fn add_edge(&mut self, prereq_id: Ustr, dependent_id: Ustr) -> Result<(), GraphError> {
        if prereq_id == dependent_id {
            return Err(GraphError::SelfDependency(prereq_id));
        }

        // The new edge runs from the prerequisite to the dependent, so a cycle appears exactly
        // when the prerequisite is already reachable from the dependent.
        if reachable(&self.dependent_map, dependent_id).contains(&prereq_id) {
            return Err(GraphError::WouldCreateCycle {
                prereq: prereq_id,
                dependent: dependent_id,
            });
        }

        self.store_edge(prereq_id, dependent_id)
            .map_err(GraphError::Storage)?;
        self.insert_edge(prereq_id, dependent_id);
        debug!(%prereq_id, %dependent_id, "added prerequisite edge");
        Ok(())
    }

    fn prereqs_of(&self, core_loop_id: Ustr) -> UstrSet {
        reachable(&self.prereq_map, core_loop_id)
    }

    fn direct_prereqs_of(&self, core_loop_id: Ustr) -> UstrSet {
        self.prereq_map.get(&core_loop_id).cloned().unwrap_or_default()
    }

    fn dependents_of(&self, core_loop_id: Ustr) -> UstrSet {
        reachable(&self.dependent_map, core_loop_id)
    }
}
