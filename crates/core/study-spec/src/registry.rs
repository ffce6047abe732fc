//! The immutable, declaration-ordered specification registry.

use std::collections::BTreeMap;

use study_common::{ItemName, ParamName, SwitchName};

use crate::{
    data_spec::DataSpec,
    error::{RegistryBuildError, UnknownItemError},
    param_spec::ParamSpec,
    switch_spec::SwitchSpec,
};

/// The complete declared schema of a study.
///
/// Built once at study-definition time and immutable afterwards. Data
/// specs keep their declaration order, which is observable: the resolver
/// breaks topological-order ties by declaration index so graph builds are
/// reproducible.
#[derive(Debug, Clone)]
pub struct Registry {
    data_specs: Vec<DataSpec>,
    data_index: BTreeMap<ItemName, usize>,
    param_specs: Vec<ParamSpec>,
    param_index: BTreeMap<ParamName, usize>,
    switch_specs: Vec<SwitchSpec>,
    switch_index: BTreeMap<SwitchName, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Looks up a data spec by name.
    pub fn data_spec(&self, name: &ItemName) -> Result<&DataSpec, UnknownItemError> {
        self.data_index
            .get(name)
            .map(|&i| &self.data_specs[i])
            .ok_or_else(|| UnknownItemError(name.clone()))
    }

    /// The declaration index of a data spec, used for deterministic
    /// tie-breaking.
    pub fn declaration_index(&self, name: &ItemName) -> Option<usize> {
        self.data_index.get(name).copied()
    }

    /// Data specs in declaration order.
    pub fn data_specs(&self) -> impl Iterator<Item = &DataSpec> {
        self.data_specs.iter()
    }

    /// Looks up a parameter spec by name.
    pub fn param_spec(&self, name: &ParamName) -> Option<&ParamSpec> {
        self.param_index.get(name).map(|&i| &self.param_specs[i])
    }

    /// Parameter specs in declaration order.
    pub fn param_specs(&self) -> impl Iterator<Item = &ParamSpec> {
        self.param_specs.iter()
    }

    /// Looks up a switch spec by name.
    pub fn switch_spec(&self, name: &SwitchName) -> Option<&SwitchSpec> {
        self.switch_index.get(name).map(|&i| &self.switch_specs[i])
    }

    /// Switch specs in declaration order.
    pub fn switch_specs(&self) -> impl Iterator<Item = &SwitchSpec> {
        self.switch_specs.iter()
    }
}

/// Accumulates specification lists and enforces name uniqueness at build
/// time.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    data_specs: Vec<DataSpec>,
    param_specs: Vec<ParamSpec>,
    switch_specs: Vec<SwitchSpec>,
}

impl RegistryBuilder {
    pub fn data_spec(mut self, spec: DataSpec) -> Self {
        self.data_specs.push(spec);
        self
    }

    pub fn data_specs(mut self, specs: impl IntoIterator<Item = DataSpec>) -> Self {
        self.data_specs.extend(specs);
        self
    }

    pub fn param_spec(mut self, spec: ParamSpec) -> Self {
        self.param_specs.push(spec);
        self
    }

    pub fn param_specs(mut self, specs: impl IntoIterator<Item = ParamSpec>) -> Self {
        self.param_specs.extend(specs);
        self
    }

    pub fn switch_spec(mut self, spec: SwitchSpec) -> Self {
        self.switch_specs.push(spec);
        self
    }

    pub fn switch_specs(mut self, specs: impl IntoIterator<Item = SwitchSpec>) -> Self {
        self.switch_specs.extend(specs);
        self
    }

    /// Finalizes the registry, rejecting duplicate names.
    pub fn build(self) -> Result<Registry, RegistryBuildError> {
        let mut data_index = BTreeMap::new();
        for (i, spec) in self.data_specs.iter().enumerate() {
            if data_index.insert(spec.name().clone(), i).is_some() {
                return Err(RegistryBuildError::DuplicateDataSpec(spec.name().clone()));
            }
        }

        let mut param_index = BTreeMap::new();
        for (i, spec) in self.param_specs.iter().enumerate() {
            if param_index.insert(spec.name().clone(), i).is_some() {
                return Err(RegistryBuildError::DuplicateParamSpec(
                    spec.name().to_string(),
                ));
            }
        }

        let mut switch_index = BTreeMap::new();
        for (i, spec) in self.switch_specs.iter().enumerate() {
            if switch_index.insert(spec.name().clone(), i).is_some() {
                return Err(RegistryBuildError::DuplicateSwitchSpec(spec.name().clone()));
            }
        }

        Ok(Registry {
            data_specs: self.data_specs,
            data_index,
            param_specs: self.param_specs,
            param_index,
            switch_specs: self.switch_specs,
            switch_index,
        })
    }
}
