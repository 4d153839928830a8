//! Turns a set of pipeline definitions into wired, executable pipelines.
//!
//! Construction is recursive and on demand: building a pipeline whose sink
//! targets another pipeline builds the target as well, and a pipeline whose
//! source is fed by another pipeline builds its upstream first. Both ends of an
//! edge share one [`PipelineConnector`], held in a registry that lives only for
//! the duration of a single [`GraphBuilder::build_report`] call.
//!
//! A pipeline that fails validation or construction is left out of the result
//! and the rest of the graph is built regardless.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Map;
use streamprep_sdk::{Buffer, Prepper, Sink, Source};
use streamprep_types::PluginSetting;

use crate::buffer::BLOCKING_BUFFER_TYPE;
use crate::config::types::PipelineDefinition;
use crate::config::validator::{
    is_pipeline_type, pipeline_reference, validate_definition, validate_edges,
};
use crate::connector::PipelineConnector;
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::pool::panic_message;
use crate::registry::PluginRegistry;

/// Result of a build run: the pipelines that were constructed and the reason
/// every other pipeline was not.
#[derive(Debug, Default)]
pub struct GraphBuild {
    pub pipelines: BTreeMap<String, Pipeline>,
    pub failures: BTreeMap<String, PipelineError>,
}

impl GraphBuild {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct GraphBuilder<'a> {
    registry: &'a PluginRegistry,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self { registry }
    }

    /// Build every definition, returning only the pipelines that succeeded.
    pub fn build(
        &self,
        definitions: &BTreeMap<String, PipelineDefinition>,
    ) -> BTreeMap<String, Pipeline> {
        self.build_report(definitions).pipelines
    }

    /// Build every definition, keeping the failure for each pipeline that
    /// could not be constructed.
    pub fn build_report(&self, definitions: &BTreeMap<String, PipelineDefinition>) -> GraphBuild {
        let mut ctx = BuildContext {
            registry: self.registry,
            definitions,
            connectors: BTreeMap::new(),
            in_progress: BTreeSet::new(),
            result: GraphBuild::default(),
        };

        for name in definitions.keys() {
            if let Some(path) = cycle_through(name, definitions) {
                ctx.fail(
                    name,
                    PipelineError::configuration(
                        name.as_str(),
                        format!("pipeline graph contains a cycle: {}", path.join(" -> ")),
                    ),
                );
            }
        }

        for name in definitions.keys() {
            ctx.ensure_built(name);
        }

        tracing::info!(
            built = ctx.result.pipelines.len(),
            failed = ctx.result.failures.len(),
            "Pipeline graph built"
        );
        ctx.result
    }
}

/// Per-run state threaded through the recursive build.
struct BuildContext<'a> {
    registry: &'a PluginRegistry,
    definitions: &'a BTreeMap<String, PipelineDefinition>,
    /// Connector per downstream pipeline name.
    connectors: BTreeMap<String, Arc<PipelineConnector>>,
    in_progress: BTreeSet<String>,
    result: GraphBuild,
}

impl BuildContext<'_> {
    fn is_settled(&self, name: &str) -> bool {
        self.result.pipelines.contains_key(name)
            || self.result.failures.contains_key(name)
            || self.in_progress.contains(name)
    }

    fn fail(&mut self, name: &str, error: PipelineError) {
        tracing::error!(pipeline = %name, error = %error, "Pipeline construction failed");
        self.result.failures.insert(name.to_string(), error);
    }

    fn ensure_built(&mut self, name: &str) {
        if self.is_settled(name) {
            return;
        }
        let definitions = self.definitions;
        let Some(definition) = definitions.get(name) else {
            return;
        };

        self.in_progress.insert(name.to_string());
        let outcome = self.construct(name, definition);
        self.in_progress.remove(name);

        match outcome {
            Ok(pipeline) => {
                tracing::info!(
                    pipeline = %name,
                    workers = pipeline.workers(),
                    preppers = pipeline.preppers().len(),
                    sinks = pipeline.sinks().len(),
                    "Pipeline constructed"
                );
                self.result.pipelines.insert(name.to_string(), pipeline);
            }
            Err(e) => self.fail(name, e),
        }
    }

    fn construct(
        &mut self,
        name: &str,
        definition: &PipelineDefinition,
    ) -> Result<Pipeline, PipelineError> {
        validate_definition(name, definition)?;
        validate_edges(name, definition, self.definitions)?;

        let source_setting = definition
            .source
            .as_ref()
            .ok_or_else(|| PipelineError::configuration(name, "source is a required component"))?;
        let source = if is_pipeline_type(source_setting) {
            self.resolve_pipeline_source(name, source_setting)?
        } else {
            let setting = stamped(source_setting, name);
            create(name, "source", || self.registry.new_source(&setting))?
        };

        let buffer_setting = definition.buffer.as_ref().map_or_else(
            || PluginSetting::new(BLOCKING_BUFFER_TYPE, Map::new()),
            Clone::clone,
        );
        let buffer: Arc<dyn Buffer> = {
            let setting = buffer_setting.with_pipeline_name(name);
            create(name, "buffer", || self.registry.new_buffer(&setting))?
        };

        let mut preppers: Vec<Arc<dyn Prepper>> = Vec::with_capacity(definition.preppers.len());
        for prepper_setting in &definition.preppers {
            let setting = stamped(prepper_setting, name);
            preppers.push(create(name, "prepper", || self.registry.new_prepper(&setting))?);
        }

        let mut sinks: Vec<Arc<dyn Sink>> = Vec::with_capacity(definition.sinks.len());
        for sink_setting in &definition.sinks {
            match pipeline_reference(sink_setting) {
                Some(target) => sinks.push(self.connect_sink(name, target)),
                None => {
                    let setting = stamped(sink_setting, name);
                    sinks.push(create(name, "sink", || self.registry.new_sink(&setting))?);
                }
            }
        }

        Ok(Pipeline::new(
            name,
            source,
            buffer,
            preppers,
            sinks,
            definition.workers() as usize,
            definition.read_batch_delay(),
        ))
    }

    /// Install (or reuse) the connector feeding `target` and make sure the
    /// target is built.
    fn connect_sink(&mut self, upstream: &str, target: &str) -> Arc<dyn Sink> {
        let connector = self.connector_for(target);
        connector.add_upstream(upstream);
        tracing::debug!(pipeline = %upstream, target = %target, "Connected pipeline sink");

        if !self.is_settled(target) {
            self.ensure_built(target);
        }
        if self.result.failures.contains_key(target) {
            tracing::warn!(
                pipeline = %upstream,
                target = %target,
                "Downstream pipeline failed to build; its connector will reject records"
            );
        }
        connector as Arc<dyn Sink>
    }

    fn resolve_pipeline_source(
        &mut self,
        name: &str,
        setting: &PluginSetting,
    ) -> Result<Arc<dyn Source>, PipelineError> {
        if let Some(connector) = self.connectors.get(name) {
            return Ok(connector.clone() as Arc<dyn Source>);
        }

        let upstreams: Vec<String> = match pipeline_reference(setting) {
            Some(upstream) => vec![upstream.to_string()],
            None => self
                .definitions
                .iter()
                .filter(|(n, d)| n.as_str() != name && targets(d, name))
                .map(|(n, _)| n.clone())
                .collect(),
        };

        for upstream in &upstreams {
            if self.in_progress.contains(upstream) {
                continue;
            }
            self.ensure_built(upstream);
            if self.connectors.contains_key(name) {
                break;
            }
        }

        if let Some(connector) = self.connectors.get(name) {
            return Ok(connector.clone() as Arc<dyn Source>);
        }

        if let Some(waiting) = upstreams.iter().find(|u| self.in_progress.contains(*u)) {
            return Err(PipelineError::configuration(
                name,
                format!("pipeline graph contains a cycle: {name} -> {waiting} -> {name}"),
            ));
        }
        let failed: Vec<&str> = upstreams
            .iter()
            .filter(|u| self.result.failures.contains_key(*u))
            .map(String::as_str)
            .collect();
        Err(PipelineError::construction(
            name,
            anyhow!("upstream pipeline(s) [{}] failed to build", failed.join(", ")),
        ))
    }

    fn connector_for(&mut self, target: &str) -> Arc<PipelineConnector> {
        self.connectors
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(PipelineConnector::new(target)))
            .clone()
    }
}

fn stamped(setting: &PluginSetting, pipeline: &str) -> PluginSetting {
    setting.clone().with_pipeline_name(pipeline)
}

/// Run a plugin factory, turning both errors and panics into a construction
/// failure for `pipeline`.
fn create<T>(
    pipeline: &str,
    role: &str,
    factory: impl FnOnce() -> anyhow::Result<T>,
) -> Result<T, PipelineError> {
    match catch_unwind(AssertUnwindSafe(factory)) {
        Ok(Ok(plugin)) => Ok(plugin),
        Ok(Err(e)) => Err(PipelineError::construction(
            pipeline,
            e.context(format!("failed to create {role}")),
        )),
        Err(payload) => Err(PipelineError::construction(
            pipeline,
            anyhow!("{role} factory panicked: {}", panic_message(payload)),
        )),
    }
}

fn targets(definition: &PipelineDefinition, target: &str) -> bool {
    definition
        .sinks
        .iter()
        .any(|sink| pipeline_reference(sink) == Some(target))
}

/// Find a path of pipeline sink edges leading from `start` back to itself.
fn cycle_through(
    start: &str,
    definitions: &BTreeMap<String, PipelineDefinition>,
) -> Option<Vec<String>> {
    fn walk(
        node: &str,
        start: &str,
        definitions: &BTreeMap<String, PipelineDefinition>,
        path: &mut Vec<String>,
        seen: &mut BTreeSet<String>,
    ) -> bool {
        let Some(definition) = definitions.get(node) else {
            return false;
        };
        for next in definition.sinks.iter().filter_map(pipeline_reference) {
            if next == start {
                path.push(next.to_string());
                return true;
            }
            if !definitions.contains_key(next) || !seen.insert(next.to_string()) {
                continue;
            }
            path.push(next.to_string());
            if walk(next, start, definitions, path, seen) {
                return true;
            }
            path.pop();
        }
        false
    }

    let mut path = vec![start.to_string()];
    let mut seen = BTreeSet::new();
    walk(start, start, definitions, &mut path, &mut seen).then_some(path)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::parser::parse_pipelines_str;
    use crate::testing::{
        event_log, numbered, numbers, CollectingSink, LoggingPrepper, StaticSource,
    };

    fn registry() -> PluginRegistry {
        let mut registry = PluginRegistry::new();
        registry
            .register_source("static", |_| {
                Ok(Arc::new(StaticSource::new(Vec::new())) as Arc<dyn Source>)
            })
            .unwrap();
        registry
            .register_prepper("logging", |_| {
                Ok(Arc::new(LoggingPrepper::new("p", event_log(), false)) as Arc<dyn Prepper>)
            })
            .unwrap();
        registry
            .register_sink("collect", |_| Ok(CollectingSink::new() as Arc<dyn Sink>))
            .unwrap();
        registry
            .register_sink("broken", |_| Err(anyhow!("sink constructor exploded")))
            .unwrap();
        registry
            .register_sink("panicky", |_| panic!("sink constructor panicked"))
            .unwrap();
        registry
    }

    fn build(yaml: &str) -> GraphBuild {
        let config = parse_pipelines_str(yaml).unwrap();
        GraphBuilder::new(&registry()).build_report(&config.definitions)
    }

    fn keys<T>(map: &BTreeMap<String, T>) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    fn same_object<A: ?Sized, B: ?Sized>(a: &Arc<A>, b: &Arc<B>) -> bool {
        std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
    }

    const INGEST_ENRICH: &str = r#"
ingest:
  source: static
  sinks:
    - pipeline:
        name: enrich
enrich:
  source:
    pipeline:
  sinks:
    - collect:
        path: /out
"#;

    #[test]
    fn test_independent_pipelines_all_built() {
        let report = build(
            r#"
a:
  source: static
  sinks: [collect]
b:
  source: static
  preppers: [logging, logging]
  sinks: [collect, collect]
  workers: 3
  delay: 50
c:
  source: static
  sinks: [collect]
"#,
        );
        assert!(report.is_complete());
        assert_eq!(keys(&report.pipelines), ["a", "b", "c"]);

        let b = &report.pipelines["b"];
        assert_eq!(b.name(), "b");
        assert_eq!(b.preppers().len(), 2);
        assert_eq!(b.workers(), 3);
        assert_eq!(b.pool_size(), 5);
        assert_eq!(b.read_batch_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_build_returns_only_pipelines() {
        let config = parse_pipelines_str("a:\n  source: static\n  sinks: [collect]\n").unwrap();
        let pipelines = GraphBuilder::new(&registry()).build(&config.definitions);
        assert_eq!(keys(&pipelines), ["a"]);
    }

    #[test]
    fn test_failing_sink_constructor_isolated() {
        let report = build(
            r#"
one:
  source: static
  sinks: [collect]
two:
  source: static
  sinks: [collect, broken]
three:
  source: static
  sinks: [collect]
"#,
        );
        assert_eq!(keys(&report.pipelines), ["one", "three"]);
        let err = &report.failures["two"];
        assert!(matches!(err, PipelineError::Construction { .. }));
        assert!(err.to_string().contains("sink constructor exploded"), "got: {err}");
    }

    #[test]
    fn test_panicking_constructor_isolated() {
        let report = build(
            "ok:\n  source: static\n  sinks: [collect]\nbad:\n  source: static\n  sinks: [panicky]\n",
        );
        assert_eq!(keys(&report.pipelines), ["ok"]);
        assert!(report.failures["bad"].to_string().contains("panicked"));
    }

    #[test]
    fn test_unknown_plugin_is_construction_error() {
        let report = build("a:\n  source: http\n  sinks: [collect]\n");
        let err = &report.failures["a"];
        assert!(matches!(err, PipelineError::Construction { .. }));
        assert!(err.to_string().contains("no source plugin registered as 'http'"));
    }

    #[test]
    fn test_invalid_definition_is_configuration_error() {
        let report = build(
            "good:\n  source: static\n  sinks: [collect]\nbad:\n  source: static\n  workers: 0\n",
        );
        assert_eq!(keys(&report.pipelines), ["good"]);
        assert!(report.failures["bad"].is_configuration());
    }

    #[test]
    fn test_ingest_enrich_share_one_connector() {
        let report = build(INGEST_ENRICH);
        assert!(report.is_complete(), "{:?}", report.failures);
        assert_eq!(keys(&report.pipelines), ["enrich", "ingest"]);

        let ingest = &report.pipelines["ingest"];
        let enrich = &report.pipelines["enrich"];
        assert!(same_object(&ingest.sinks()[0], enrich.source()));
    }

    #[test]
    fn test_named_source_resolves_same_connector_in_either_order() {
        // "down" sorts before "up", so its source is resolved before the sink side.
        let report = build(
            r#"
up:
  source: static
  sinks:
    - pipeline:
        name: down
    - collect
down:
  source:
    pipeline:
      name: up
  sinks: [collect]
"#,
        );
        assert!(report.is_complete(), "{:?}", report.failures);
        let up = &report.pipelines["up"];
        let down = &report.pipelines["down"];
        assert!(same_object(&up.sinks()[0], down.source()));
    }

    #[test]
    fn test_fan_in_shares_connector() {
        let report = build(
            r#"
left:
  source: static
  sinks:
    - pipeline:
        name: merged
right:
  source: static
  sinks:
    - pipeline:
        name: merged
merged:
  source: pipeline
  sinks: [collect]
"#,
        );
        assert!(report.is_complete(), "{:?}", report.failures);
        let merged = report.pipelines["merged"].source();
        assert!(same_object(&report.pipelines["left"].sinks()[0], merged));
        assert!(same_object(&report.pipelines["right"].sinks()[0], merged));
    }

    #[tokio::test]
    async fn test_records_cross_connector_in_order() {
        let report = build(INGEST_ENRICH);
        let ingest = &report.pipelines["ingest"];
        let enrich = &report.pipelines["enrich"];

        enrich.source().start(enrich.buffer().clone()).await.unwrap();
        for handle in ingest.publish_to_sinks(numbered(5)) {
            handle.await.unwrap().unwrap();
        }

        let batch = enrich.buffer().read(Duration::from_millis(100)).await;
        assert_eq!(numbers(&batch), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_cycle_detected_and_both_omitted() {
        let report = build(
            r#"
a:
  source: pipeline
  sinks:
    - pipeline:
        name: b
b:
  source: pipeline
  sinks:
    - pipeline:
        name: a
standalone:
  source: static
  sinks: [collect]
"#,
        );
        assert_eq!(keys(&report.pipelines), ["standalone"]);
        for name in ["a", "b"] {
            let err = &report.failures[name];
            assert!(err.is_configuration());
            assert!(err.to_string().contains("cycle"), "got: {err}");
        }
        assert!(report.failures["a"].to_string().contains("a -> b -> a"));
    }

    #[test]
    fn test_upstream_failure_propagates() {
        let report = build(
            r#"
first:
  source: static
  sinks:
    - pipeline:
        name: second
    - broken
second:
  source:
    pipeline:
      name: first
  sinks: [collect]
"#,
        );
        assert!(report.pipelines.contains_key("second"));
        assert!(report.failures.contains_key("first"));

        let report = build(
            r#"
first:
  source: http
  sinks:
    - pipeline:
        name: second
second:
  source:
    pipeline:
      name: first
  sinks: [collect]
"#,
        );
        assert!(report.pipelines.is_empty());
        let err = &report.failures["second"];
        assert!(matches!(err, PipelineError::Construction { .. }));
        assert!(err.to_string().contains("upstream pipeline(s) [first]"), "got: {err}");
    }

    #[test]
    fn test_dangling_edge_fails_only_that_pipeline() {
        let report = build(
            r#"
a:
  source: static
  sinks:
    - pipeline:
        name: nowhere
b:
  source: static
  sinks: [collect]
"#,
        );
        assert_eq!(keys(&report.pipelines), ["b"]);
        assert!(report.failures["a"].is_configuration());
    }

    #[test]
    fn test_cycle_through_finds_path() {
        let config = parse_pipelines_str(
            r#"
x:
  source: static
  sinks:
    - pipeline:
        name: y
y:
  source: pipeline
  sinks:
    - pipeline:
        name: z
z:
  source: pipeline
  sinks:
    - pipeline:
        name: x
w:
  source: static
  sinks: [collect]
"#,
        )
        .unwrap();
        assert_eq!(
            cycle_through("x", &config.definitions).unwrap(),
            ["x", "y", "z", "x"]
        );
        assert!(cycle_through("w", &config.definitions).is_none());
    }
}
