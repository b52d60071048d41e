use crate::engine::config::{
    Config, MAP_EXECUTORS, PRINTER_EXECUTORS, REDUCE_EXECUTORS, SPOUT_EXECUTORS,
};
use crate::engine::error::{Result, StormError};
use crate::engine::functions::builtins;
use crate::engine::grouping::Grouping;
use crate::engine::tuple::Fields;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Declared spout node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpoutDecl {
    /// Registry id of the spout implementation
    pub component: String,
    /// Executors per worker
    pub parallelism: usize,
}

/// Declared bolt node and the stream feeding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoltDecl {
    pub component: String,
    pub parallelism: usize,
    pub upstream: String,
    pub grouping: Grouping,
}

/// Immutable job graph, identical on every worker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    spouts: BTreeMap<String, SpoutDecl>,
    bolts: BTreeMap<String, BoltDecl>,
}

impl Topology {
    pub fn spouts(&self) -> &BTreeMap<String, SpoutDecl> {
        &self.spouts
    }

    pub fn bolts(&self) -> &BTreeMap<String, BoltDecl> {
        &self.bolts
    }

    /// Per-worker executor count of a spout or bolt node
    pub fn parallelism(&self, node: &str) -> Option<usize> {
        self.spouts
            .get(node)
            .map(|s| s.parallelism)
            .or_else(|| self.bolts.get(node).map(|b| b.parallelism))
    }

    /// Bolts subscribed to the output of `node`
    pub fn subscribers<'a>(&'a self, node: &'a str) -> impl Iterator<Item = (&'a String, &'a BoltDecl)> {
        self.bolts.iter().filter(move |(_, b)| b.upstream == node)
    }

    /// Structural checks; a topology received over the wire goes through these too
    pub fn validate(&self) -> Result<()> {
        if self.spouts.is_empty() {
            return Err(StormError::config("topology declares no spouts"));
        }

        for (name, spout) in &self.spouts {
            if spout.parallelism == 0 {
                return Err(StormError::config(format!(
                    "spout '{}' has parallelism 0",
                    name
                )));
            }
            if self.bolts.contains_key(name) {
                return Err(StormError::config(format!(
                    "node '{}' declared as both spout and bolt",
                    name
                )));
            }
        }

        for (name, bolt) in &self.bolts {
            if bolt.parallelism == 0 {
                return Err(StormError::config(format!(
                    "bolt '{}' has parallelism 0",
                    name
                )));
            }
            if self.parallelism(&bolt.upstream).is_none() {
                return Err(StormError::config(format!(
                    "bolt '{}' subscribes to undeclared node '{}'",
                    name, bolt.upstream
                )));
            }
            if let Grouping::Fields { fields } = &bolt.grouping {
                if fields.is_empty() {
                    return Err(StormError::config(format!(
                        "bolt '{}' has an empty fields grouping",
                        name
                    )));
                }
            }
            self.check_reaches_spout(name)?;
        }
        Ok(())
    }

    fn check_reaches_spout(&self, bolt: &str) -> Result<()> {
        let mut seen = HashSet::new();
        let mut current = bolt;
        while let Some(decl) = self.bolts.get(current) {
            if !seen.insert(current) {
                return Err(StormError::config(format!(
                    "bolt '{}' is part of a cycle",
                    bolt
                )));
            }
            current = decl.upstream.as_str();
        }
        Ok(())
    }
}

struct PendingBolt {
    component: String,
    parallelism: usize,
    groupings: Vec<(String, Grouping)>,
}

/// Assembles a [`Topology`]. Mistakes are collected and reported by
/// [`TopologyBuilder::create_topology`].
#[derive(Default)]
pub struct TopologyBuilder {
    spouts: Vec<(String, SpoutDecl)>,
    bolts: Vec<(String, PendingBolt)>,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spout(
        &mut self,
        name: impl Into<String>,
        component: impl Into<String>,
        parallelism: usize,
    ) -> &mut Self {
        self.spouts.push((
            name.into(),
            SpoutDecl {
                component: component.into(),
                parallelism,
            },
        ));
        self
    }

    /// Declares a bolt; exactly one grouping must follow on the returned declarer
    pub fn set_bolt(
        &mut self,
        name: impl Into<String>,
        component: impl Into<String>,
        parallelism: usize,
    ) -> BoltDeclarer<'_> {
        self.bolts.push((
            name.into(),
            PendingBolt {
                component: component.into(),
                parallelism,
                groupings: Vec::new(),
            },
        ));
        let index = self.bolts.len() - 1;
        BoltDeclarer {
            builder: self,
            index,
        }
    }

    pub fn create_topology(&self) -> Result<Topology> {
        let mut topology = Topology::default();

        for (name, spout) in &self.spouts {
            if topology.spouts.insert(name.clone(), spout.clone()).is_some() {
                return Err(StormError::config(format!("duplicate node name '{}'", name)));
            }
        }

        for (name, bolt) in &self.bolts {
            let (upstream, grouping) = match bolt.groupings.as_slice() {
                [single] => single.clone(),
                [] => {
                    return Err(StormError::config(format!(
                        "bolt '{}' has no grouping",
                        name
                    )));
                }
                _ => {
                    return Err(StormError::config(format!(
                        "bolt '{}' declares more than one grouping",
                        name
                    )));
                }
            };
            let decl = BoltDecl {
                component: bolt.component.clone(),
                parallelism: bolt.parallelism,
                upstream,
                grouping,
            };
            if topology.spouts.contains_key(name)
                || topology.bolts.insert(name.clone(), decl).is_some()
            {
                return Err(StormError::config(format!("duplicate node name '{}'", name)));
            }
        }

        topology.validate()?;
        Ok(topology)
    }
}

/// Chooses how a freshly declared bolt receives its input
pub struct BoltDeclarer<'a> {
    builder: &'a mut TopologyBuilder,
    index: usize,
}

impl BoltDeclarer<'_> {
    fn group(self, upstream: impl Into<String>, grouping: Grouping) -> Self {
        self.builder.bolts[self.index]
            .1
            .groupings
            .push((upstream.into(), grouping));
        self
    }

    pub fn fields_grouping<I, S>(self, upstream: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group(
            upstream,
            Grouping::Fields {
                fields: Fields::new(fields),
            },
        )
    }

    pub fn broadcast_grouping(self, upstream: impl Into<String>) -> Self {
        self.group(upstream, Grouping::Broadcast)
    }

    /// Same as [`BoltDeclarer::broadcast_grouping`]
    pub fn first_grouping(self, upstream: impl Into<String>) -> Self {
        self.broadcast_grouping(upstream)
    }

    pub fn shuffle_grouping(self, upstream: impl Into<String>) -> Self {
        self.group(upstream, Grouping::Shuffle)
    }
}

pub const WORD_SPOUT: &str = "WORD_SPOUT";
pub const WORD_MAP: &str = "WORD_MAP";
pub const WORD_REDUCE: &str = "WORD_REDUCE";
pub const WORD_PRINTER: &str = "WORD_PRINTER";

/// The built-in map/reduce pipeline sized from the job configuration.
///
/// `mapExecutors` and `reduceExecutors` are required; `spoutExecutors` and
/// `printerExecutors` default to 1. A zero count is rejected like any other
/// zero parallelism.
pub fn map_reduce_topology(config: &Config) -> Result<Topology> {
    let mut builder = TopologyBuilder::new();
    builder.set_spout(
        WORD_SPOUT,
        builtins::FILE_SPOUT,
        config.usize_or(SPOUT_EXECUTORS, 1)?,
    );
    builder
        .set_bolt(
            WORD_MAP,
            builtins::MAP_BOLT,
            config.require_usize(MAP_EXECUTORS)?,
        )
        .fields_grouping(WORD_SPOUT, ["key"]);
    builder
        .set_bolt(
            WORD_REDUCE,
            builtins::REDUCE_BOLT,
            config.require_usize(REDUCE_EXECUTORS)?,
        )
        .fields_grouping(WORD_MAP, ["key"]);
    builder
        .set_bolt(
            WORD_PRINTER,
            builtins::PRINT_BOLT,
            config.usize_or(PRINTER_EXECUTORS, 1)?,
        )
        .first_grouping(WORD_REDUCE);
    builder.create_topology()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count() -> TopologyBuilder {
        let mut builder = TopologyBuilder::new();
        builder.set_spout("SPOUT", "file", 1);
        builder
            .set_bolt("MAP", "map", 2)
            .shuffle_grouping("SPOUT");
        builder
            .set_bolt("REDUCE", "reduce", 2)
            .fields_grouping("MAP", ["key"]);
        builder
            .set_bolt("PRINT", "print", 1)
            .first_grouping("REDUCE");
        builder
    }

    #[test]
    fn test_create_topology() {
        let topology = word_count().create_topology().unwrap();
        assert_eq!(topology.parallelism("MAP"), Some(2));
        assert_eq!(topology.parallelism("SPOUT"), Some(1));
        assert_eq!(topology.bolts()["PRINT"].grouping, Grouping::Broadcast);
        let subscribers: Vec<&String> = topology.subscribers("MAP").map(|(n, _)| n).collect();
        assert_eq!(subscribers, vec!["REDUCE"]);
    }

    #[test]
    fn test_rejects_zero_parallelism() {
        let mut builder = TopologyBuilder::new();
        builder.set_spout("SPOUT", "file", 0);
        assert!(matches!(
            builder.create_topology(),
            Err(StormError::Config(_))
        ));

        let mut builder = word_count();
        builder.set_bolt("EXTRA", "print", 0).shuffle_grouping("SPOUT");
        assert!(builder.create_topology().is_err());
    }

    #[test]
    fn test_rejects_missing_grouping() {
        let mut builder = word_count();
        builder.set_bolt("LONELY", "print", 1);
        let err = builder.create_topology().unwrap_err();
        assert!(err.to_string().contains("no grouping"));
    }

    #[test]
    fn test_rejects_second_grouping() {
        let mut builder = word_count();
        builder
            .set_bolt("TWICE", "print", 1)
            .shuffle_grouping("SPOUT")
            .broadcast_grouping("MAP");
        assert!(builder.create_topology().is_err());
    }

    #[test]
    fn test_rejects_unknown_upstream() {
        let mut builder = word_count();
        builder.set_bolt("ORPHAN", "print", 1).shuffle_grouping("NOPE");
        let err = builder.create_topology().unwrap_err();
        assert!(err.to_string().contains("undeclared node 'NOPE'"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let mut builder = word_count();
        builder.set_bolt("MAP", "map", 1).shuffle_grouping("SPOUT");
        assert!(builder.create_topology().is_err());

        let mut builder = word_count();
        builder.set_bolt("SPOUT", "map", 1).shuffle_grouping("MAP");
        assert!(builder.create_topology().is_err());
    }

    #[test]
    fn test_rejects_empty_topology_and_fields() {
        assert!(TopologyBuilder::new().create_topology().is_err());

        let mut builder = TopologyBuilder::new();
        builder.set_spout("SPOUT", "file", 1);
        builder
            .set_bolt("MAP", "map", 1)
            .fields_grouping("SPOUT", Vec::<String>::new());
        assert!(builder.create_topology().is_err());
    }

    #[test]
    fn test_rejects_cycle() {
        let mut builder = TopologyBuilder::new();
        builder.set_spout("SPOUT", "file", 1);
        builder.set_bolt("A", "map", 1).shuffle_grouping("B");
        builder.set_bolt("B", "map", 1).shuffle_grouping("A");
        let err = builder.create_topology().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_topology_serde() {
        let topology = word_count().create_topology().unwrap();
        let json = serde_json::to_string(&topology).unwrap();
        let back: Topology = serde_json::from_str(&json).unwrap();
        assert_eq!(back, topology);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_map_reduce_topology_from_config() {
        let config = Config::new()
            .with(MAP_EXECUTORS, "3")
            .with(REDUCE_EXECUTORS, "2");
        let topology = map_reduce_topology(&config).unwrap();

        assert_eq!(topology.parallelism(WORD_SPOUT), Some(1));
        assert_eq!(topology.parallelism(WORD_MAP), Some(3));
        assert_eq!(topology.parallelism(WORD_REDUCE), Some(2));
        assert_eq!(topology.parallelism(WORD_PRINTER), Some(1));
        assert_eq!(topology.spouts()[WORD_SPOUT].component, builtins::FILE_SPOUT);
        assert_eq!(topology.bolts()[WORD_MAP].upstream, WORD_SPOUT);
        assert_eq!(
            topology.bolts()[WORD_REDUCE].grouping,
            Grouping::Fields {
                fields: Fields::new(["key"])
            }
        );
        assert_eq!(topology.bolts()[WORD_PRINTER].grouping, Grouping::Broadcast);

        let config = config.with(SPOUT_EXECUTORS, "4").with(PRINTER_EXECUTORS, "2");
        let topology = map_reduce_topology(&config).unwrap();
        assert_eq!(topology.parallelism(WORD_SPOUT), Some(4));
        assert_eq!(topology.parallelism(WORD_PRINTER), Some(2));
    }

    #[test]
    fn test_map_reduce_topology_rejects_bad_counts() {
        let missing = Config::new().with(REDUCE_EXECUTORS, "2");
        assert!(matches!(
            map_reduce_topology(&missing),
            Err(StormError::Config(_))
        ));

        let zero = Config::new()
            .with(MAP_EXECUTORS, "0")
            .with(REDUCE_EXECUTORS, "2");
        assert!(matches!(
            map_reduce_topology(&zero),
            Err(StormError::Config(_))
        ));

        let negative = Config::new()
            .with(MAP_EXECUTORS, "2")
            .with(REDUCE_EXECUTORS, "-1");
        assert!(matches!(
            map_reduce_topology(&negative),
            Err(StormError::Config(_))
        ));
    }
}
