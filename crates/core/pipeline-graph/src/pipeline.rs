//! Pipeline declarations and the pipeline set.

use std::{collections::BTreeMap, sync::Arc};

use study_common::{ItemName, ParamName, ParamValue, PipelineName, SwitchName, SwitchValue};
use study_spec::Registry;

use crate::{
    build_ctx::{BuildCtx, PipelineBuild},
    error::{BuildError, PipelineSetError},
    requirements::Requirements,
};

type BuildFn = dyn Fn(&mut BuildCtx<'_>) -> Result<(), BuildError> + Send + Sync;

/// A named pipeline: the declared producer of one or more derived items.
///
/// The declaration lists the registry items the pipeline consumes and
/// produces; the build function emits the concrete node graph for the
/// current parameter/switch bindings. Consumed items that the build's
/// selected branch does not actually reference are still declared — the
/// declaration is the dependency contract the resolver traverses.
#[derive(Clone)]
pub struct Pipeline {
    name: PipelineName,
    inputs: Vec<ItemName>,
    outputs: Vec<ItemName>,
    requirements: Requirements,
    build_fn: Arc<BuildFn>,
}

impl Pipeline {
    pub fn new<F>(name: PipelineName, build_fn: F) -> Self
    where
        F: Fn(&mut BuildCtx<'_>) -> Result<(), BuildError> + Send + Sync + 'static,
    {
        Self {
            name,
            inputs: Vec::new(),
            outputs: Vec::new(),
            requirements: Requirements::default(),
            build_fn: Arc::new(build_fn),
        }
    }

    /// Declares a consumed registry item.
    pub fn input(mut self, item: ItemName) -> Self {
        self.inputs.push(item);
        self
    }

    /// Declares a produced registry item.
    pub fn output(mut self, item: ItemName) -> Self {
        self.outputs.push(item);
        self
    }

    /// Declares the pipeline-level default requirements, applied to every
    /// node that does not override them.
    pub fn requirements(mut self, requirements: Requirements) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn name(&self) -> &PipelineName {
        &self.name
    }

    pub fn inputs(&self) -> &[ItemName] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ItemName] {
        &self.outputs
    }

    pub fn default_requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// Runs the build function against the given bindings and validates
    /// the emitted graph.
    #[tracing::instrument(skip_all, fields(pipeline = %self.name), err)]
    pub fn build(
        &self,
        registry: &Registry,
        params: &BTreeMap<ParamName, ParamValue>,
        switches: &BTreeMap<SwitchName, SwitchValue>,
    ) -> Result<PipelineBuild, BuildError> {
        let mut ctx = BuildCtx::new(registry, params, switches);
        (self.build_fn)(&mut ctx)?;
        ctx.finish(&self.outputs)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// The name-unique, declaration-ordered set of a study's pipelines.
#[derive(Debug, Clone, Default)]
pub struct PipelineSet {
    pipelines: Vec<Pipeline>,
    index: BTreeMap<PipelineName, usize>,
}

impl PipelineSet {
    pub fn new(pipelines: Vec<Pipeline>) -> Result<Self, PipelineSetError> {
        let mut index = BTreeMap::new();
        for (i, pipeline) in pipelines.iter().enumerate() {
            if index.insert(pipeline.name().clone(), i).is_some() {
                return Err(PipelineSetError::DuplicatePipeline(pipeline.name().clone()));
            }
        }
        Ok(Self { pipelines, index })
    }

    pub fn get(&self, name: &PipelineName) -> Option<&Pipeline> {
        self.index.get(name).map(|&i| &self.pipelines[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pipeline> {
        self.pipelines.iter()
    }
}

#[cfg(test)]
mod tests {
    use study_common::{Frequency, SwitchName};
    use study_spec::{DataSpec, Registry, SwitchSpec};

    use super::{Pipeline, PipelineSet};
    use crate::{
        command::CommandTemplate,
        error::{BuildError, GraphError},
        node::Node,
    };

    fn registry() -> Registry {
        Registry::builder()
            .data_spec(DataSpec::acquired_fileset(
                "acquired_file1".parse().expect("valid name"),
                "text".parse().expect("valid format"),
                Frequency::PerSession,
            ))
            .data_spec(DataSpec::derived_field(
                "derived_field1".parse().expect("valid name"),
                Frequency::PerSession,
                "pipeline1".parse().expect("valid name"),
            ))
            .switch_spec(
                SwitchSpec::choices(
                    "pipeline2_tool".parse().expect("valid name"),
                    ["toolA", "toolB"],
                    "toolA",
                )
                .expect("valid switch"),
            )
            .switch_spec(SwitchSpec::boolean(
                "use_fancy_step".parse().expect("valid name"),
                false,
            ))
            .build()
            .expect("valid registry")
    }

    fn default_switches(
        registry: &Registry,
    ) -> std::collections::BTreeMap<study_common::SwitchName, study_common::SwitchValue> {
        registry
            .switch_specs()
            .map(|s| (s.name().clone(), s.default().clone()))
            .collect()
    }

    #[test]
    fn boolean_unhandled_branch_names_the_switch() {
        //* Given
        // A build that probes a boolean switch but handles neither value.
        let pipeline = Pipeline::new(
            "pipeline1".parse().expect("valid name"),
            |ctx| {
                let _ = ctx.branch("use_fancy_step")?;
                Err(ctx.unhandled("use_fancy_step"))
            },
        );
        let registry = registry();

        //* When
        let result = pipeline.build(&registry, &Default::default(), &default_switches(&registry));

        //* Then
        assert!(matches!(
            result,
            Err(BuildError::UnhandledBranch { switch }) if switch == "use_fancy_step"
        ));
    }

    #[test]
    fn enumerated_unhandled_branch_names_the_switch() {
        //* Given
        let pipeline = Pipeline::new(
            "pipeline2".parse().expect("valid name"),
            |ctx| {
                // Probes cover the whole declared domain but the build
                // still falls through to its fallback path.
                let _ = ctx.branch_is("pipeline2_tool", "toolA")?;
                let _ = ctx.branch_is("pipeline2_tool", "toolB")?;
                Err(ctx.unhandled("pipeline2_tool"))
            },
        );
        let registry = registry();

        //* When
        let result = pipeline.build(&registry, &Default::default(), &default_switches(&registry));

        //* Then
        assert!(matches!(
            result,
            Err(BuildError::UnhandledBranch { switch }) if switch == "pipeline2_tool"
        ));
    }

    #[test]
    fn probing_outside_the_domain_is_structural() {
        //* Given
        let pipeline = Pipeline::new(
            "pipeline2".parse().expect("valid name"),
            |ctx| {
                let _ = ctx.branch_is("pipeline2_tool", "tool_c")?;
                Ok(())
            },
        );
        let registry = registry();

        //* When
        let result = pipeline.build(&registry, &Default::default(), &default_switches(&registry));

        //* Then
        assert!(matches!(result, Err(BuildError::SwitchDomain(_))));
    }

    #[test]
    fn build_records_switch_reads() {
        //* Given
        let pipeline = Pipeline::new(
            "pipeline2".parse().expect("valid name"),
            |ctx| {
                if ctx.branch_is("pipeline2_tool", "toolA")? {
                    ctx.add_node(
                        Node::new("node1", CommandTemplate::new(["tool_a"]))
                            .output_item("out", "derived_field1".parse().expect("valid name")),
                    );
                    Ok(())
                } else {
                    Err(ctx.unhandled("pipeline2_tool"))
                }
            },
        )
        .output("derived_field1".parse().expect("valid name"));
        let registry = registry();

        //* When
        let build = pipeline
            .build(&registry, &Default::default(), &default_switches(&registry))
            .expect("build succeeds");

        //* Then
        assert_eq!(build.switches_read.len(), 1);
        assert!(
            build
                .switches_read
                .keys()
                .any(|name| name == &"pipeline2_tool".parse::<SwitchName>().expect("valid name"))
        );
    }

    #[test]
    fn missing_declared_output_fails_validation() {
        //* Given
        // Pipeline declares an output its graph never binds.
        let pipeline = Pipeline::new("pipeline1".parse().expect("valid name"), |_| Ok(()))
            .output("derived_field1".parse().expect("valid name"));
        let registry = registry();

        //* When
        let result = pipeline.build(&registry, &Default::default(), &default_switches(&registry));

        //* Then
        assert!(matches!(
            result,
            Err(BuildError::Graph(GraphError::UnboundOutputItem(item))) if item == "derived_field1"
        ));
    }

    #[test]
    fn duplicate_pipeline_names_are_rejected() {
        let a = Pipeline::new("pipeline1".parse().expect("valid name"), |_| Ok(()));
        let b = Pipeline::new("pipeline1".parse().expect("valid name"), |_| Ok(()));
        assert!(PipelineSet::new(vec![a, b]).is_err());
    }
}
