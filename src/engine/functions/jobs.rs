use super::Job;
use crate::engine::collector::OutputCollector;
use crate::engine::error::{Result, StormError};

/// Counts lowercase words across every input line
pub struct WordCount;

impl Job for WordCount {
    fn map(&self, _key: &str, value: &str, collector: &OutputCollector) -> Result<()> {
        for word in value
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            collector.write(word.to_lowercase(), "1")?;
        }
        Ok(())
    }

    fn reduce(&self, key: &str, values: &[String], collector: &OutputCollector) -> Result<()> {
        collector.write(key, sum(key, values)?.to_string())
    }
}

/// Passes records through and sums the integer values per key
pub struct SumByKey;

impl Job for SumByKey {
    fn map(&self, key: &str, value: &str, collector: &OutputCollector) -> Result<()> {
        collector.write(key, value)
    }

    fn reduce(&self, key: &str, values: &[String], collector: &OutputCollector) -> Result<()> {
        collector.write(key, sum(key, values)?.to_string())
    }
}

fn sum(key: &str, values: &[String]) -> Result<i64> {
    values.iter().try_fold(0i64, |acc, v| {
        v.trim().parse::<i64>().map(|n| acc + n).map_err(|_| {
            StormError::execution(
                format!("value '{}' for key '{}' is not an integer", v, key),
                None,
            )
        })
    })
}
