use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Program, Sequence, Target, Tensor};
use crate::primitive::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
use crate::types::{
    JsonCodec, TileIndex, VertexAttributeF32, VertexAttributeU32, VertexIOInfo, VertexIOType,
};

use super::create_sharded_variable;

/// Kernel mapped on a list of tiles with identical I/O shapes and constant attributes.
///
/// Compute sets on disjoint tiles may execute in parallel on hardware, so independent
/// equations should be given disjoint tile lists.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TileMapEquation {
    #[serde(alias = "pname")]
    pub primitive_name: String,
    #[serde(alias = "vname")]
    pub kernel_name: String,
    pub tiles: Vec<TileIndex>,
    #[serde(default)]
    pub inputs_info: Vec<VertexIOInfo>,
    #[serde(default)]
    pub outputs_info: Vec<VertexIOInfo>,
    #[serde(default)]
    pub attributes_u32: Vec<VertexAttributeU32>,
    #[serde(default)]
    pub attributes_f32: Vec<VertexAttributeF32>,
    /// Kernel source registered on the graph as a codelet. Empty: none.
    #[serde(default, alias = "gp_filename")]
    pub external_code_ref: String,
    /// Cycle estimate set on every vertex. Zero: none.
    #[serde(default)]
    pub perf_estimate: u64,
}

impl JsonCodec for TileMapEquation {}

impl TileMapEquation {
    pub fn new(
        primitive_name: impl Into<String>,
        kernel_name: impl Into<String>,
        tiles: Vec<TileIndex>,
    ) -> Self {
        Self {
            primitive_name: primitive_name.into(),
            kernel_name: kernel_name.into(),
            tiles,
            ..Self::default()
        }
    }

    pub fn with_inputs(mut self, inputs_info: Vec<VertexIOInfo>) -> Self {
        self.inputs_info = inputs_info;
        self
    }

    pub fn with_outputs(mut self, outputs_info: Vec<VertexIOInfo>) -> Self {
        self.outputs_info = outputs_info;
        self
    }

    pub fn with_attributes(
        mut self,
        attributes_u32: Vec<VertexAttributeU32>,
        attributes_f32: Vec<VertexAttributeF32>,
    ) -> Self {
        self.attributes_u32 = attributes_u32;
        self.attributes_f32 = attributes_f32;
        self
    }

    pub fn with_external_code_ref(mut self, source: impl Into<String>) -> Self {
        self.external_code_ref = source.into();
        self
    }

    pub fn with_perf_estimate(mut self, cycles: u64) -> Self {
        self.perf_estimate = cycles;
        self
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    /// Descriptors of the inputs passed as tensors, i.e. every non-constant input.
    fn tensor_inputs(&self) -> impl Iterator<Item = &VertexIOInfo> {
        self.inputs_info.iter().filter(|info| !info.is_constant())
    }

    /// Position of input `name` among the tensor inputs.
    fn input_index(&self, name: &str) -> TileResult<usize> {
        self.tensor_inputs()
            .position(|info| info.name == name)
            .ok_or_else(|| TileError::NameResolution {
                primitive: self.primitive_name.clone(),
                name: name.to_string(),
            })
    }

    /// Structural checks run before any graph mutation.
    ///
    /// Inputs, pure `Out` outputs and attributes all bind vertex fields, so their names
    /// share one namespace. InOut outputs reuse the field of their input.
    pub fn validate(&self, target: &Target) -> TileResult<()> {
        let mut seen_tiles = HashSet::new();
        for &tile in &self.tiles {
            target.check_tile(tile)?;
            if !seen_tiles.insert(tile) {
                return Err(TileError::design(format!(
                    "{}: tile {tile} listed more than once",
                    self.primitive_name
                )));
            }
        }
        for (list, infos) in [("input", &self.inputs_info), ("output", &self.outputs_info)] {
            let mut names = HashSet::new();
            for info in infos {
                info.check_rank()?;
                info.check_constant()?;
                if !names.insert(info.name.as_str()) {
                    return Err(TileError::design(format!(
                        "{}: duplicate {list} name '{}'",
                        self.primitive_name, info.name
                    )));
                }
            }
        }
        for info in &self.outputs_info {
            match info.iotype {
                VertexIOType::InOut => {
                    self.input_index(&info.name)?;
                }
                VertexIOType::Out => {}
                VertexIOType::In => {
                    return Err(TileError::design(format!(
                        "{}: output '{}' declared as input only",
                        self.primitive_name, info.name
                    )));
                }
            }
        }
        let fields = self
            .inputs_info
            .iter()
            .map(|info| info.name.as_str())
            .chain(
                self.outputs_info
                    .iter()
                    .filter(|info| info.iotype == VertexIOType::Out)
                    .map(|info| info.name.as_str()),
            )
            .chain(self.attributes_u32.iter().map(|attr| attr.name.as_str()))
            .chain(self.attributes_f32.iter().map(|attr| attr.name.as_str()));
        let mut seen = HashSet::new();
        for name in fields {
            if !seen.insert(name) {
                return Err(TileError::design(format!(
                    "{}: vertex field '{name}' bound more than once",
                    self.primitive_name
                )));
            }
        }
        Ok(())
    }

    fn check_tensors<'a>(
        &self,
        kind: &str,
        tensors: &[Tensor],
        infos: impl ExactSizeIterator<Item = &'a VertexIOInfo>,
    ) -> TileResult<()> {
        if tensors.len() != infos.len() {
            return Err(TileError::contract(format!(
                "{}: {} {kind} tensors for {} {kind} descriptors",
                self.primitive_name,
                tensors.len(),
                infos.len()
            )));
        }
        for (tensor, info) in tensors.iter().zip(infos) {
            if tensor.leading_dim() != Some(self.tiles.len()) {
                return Err(TileError::shape_mismatch(
                    self.primitive_name.clone(),
                    format!(
                        "{kind} '{}' of shape {:?} is not sharded over {} tiles",
                        info.name,
                        tensor.shape(),
                        self.tiles.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_inputs(&self, target: &Target, inputs: &[Tensor]) -> TileResult<()> {
        let tensor_inputs: Vec<&VertexIOInfo> = self.tensor_inputs().collect();
        self.check_tensors("input", inputs, tensor_inputs.into_iter())?;
        self.validate(target)
    }

    /// Resolves output tensors: InOut outputs reuse the named input, Out outputs are allocated
    /// as `[len(tiles), *aval.shape]` sharded over the equation tiles.
    ///
    /// `inputs` holds one tensor per non-constant input descriptor.
    pub fn allocate_output_tensors(&self, graph: &mut Graph, inputs: &[Tensor]) -> TileResult<Vec<Tensor>> {
        self.check_inputs(&graph.target(), inputs)?;
        self.allocate_checked(graph, inputs)
    }

    fn allocate_checked(&self, graph: &mut Graph, inputs: &[Tensor]) -> TileResult<Vec<Tensor>> {
        let mut outputs = Vec::with_capacity(self.outputs_info.len());
        for info in &self.outputs_info {
            match info.iotype {
                VertexIOType::InOut => outputs.push(inputs[self.input_index(&info.name)?].clone()),
                VertexIOType::Out => outputs.push(create_sharded_variable(
                    graph,
                    info.dtype(),
                    info.shape(),
                    &self.tiles,
                    &format!("{}/{}", self.primitive_name, info.name),
                )?),
                VertexIOType::In => {
                    return Err(TileError::design(format!(
                        "{}: unknown io type for output '{}'",
                        self.primitive_name, info.name
                    )))
                }
            }
        }
        Ok(outputs)
    }

    /// Adds one vertex per tile to a fresh compute set and executes it in `prog`.
    ///
    /// Constant inputs are materialized once per tile, on that tile.
    pub fn attach(
        &self,
        graph: &mut Graph,
        prog: &mut Sequence,
        inputs: &[Tensor],
        outputs: &[Tensor],
        debug_prefix: &str,
    ) -> TileResult<()> {
        self.check_inputs(&graph.target(), inputs)?;
        self.check_tensors("output", outputs, self.outputs_info.iter())?;
        self.attach_checked(graph, prog, inputs, outputs, debug_prefix)
    }

    fn attach_checked(
        &self,
        graph: &mut Graph,
        prog: &mut Sequence,
        inputs: &[Tensor],
        outputs: &[Tensor],
        debug_prefix: &str,
    ) -> TileResult<()> {
        let debug_name = if debug_prefix.is_empty() {
            self.primitive_name.clone()
        } else {
            format!("{debug_prefix}/{}", self.primitive_name)
        };
        log::debug!(
            "{debug_name}: kernel {} on {} tiles",
            self.kernel_name,
            self.tiles.len()
        );
        if !self.external_code_ref.is_empty() {
            graph.add_codelets(&self.external_code_ref);
        }

        let cs = graph.add_compute_set(&debug_name);
        for (tidx, &tile) in self.tiles.iter().enumerate() {
            let vertex = graph.add_vertex(cs, &self.kernel_name)?;
            graph.set_vertex_tile(vertex, tile)?;
            if self.perf_estimate > 0 {
                graph.set_perf_estimate(vertex, self.perf_estimate)?;
            }
            let mut tensors = inputs.iter();
            for info in &self.inputs_info {
                let slice = match &info.constant_data {
                    Some(data) => {
                        let constant = graph.add_constant(
                            info.dtype(),
                            info.shape(),
                            data.as_bytes(),
                            &format!("{debug_name}/{}/{tile}", info.name),
                        )?;
                        graph.set_tile_mapping(&constant, tile)?;
                        constant
                    }
                    None => tensors
                        .next()
                        .ok_or_else(|| {
                            TileError::contract(format!("{debug_name}: missing input '{}'", info.name))
                        })?
                        .index(tidx)?,
                };
                graph.connect(vertex, &info.name, &info.connect_reshape(&slice)?)?;
            }
            // InOut outputs are already connected through their input.
            for (output, info) in outputs.iter().zip(&self.outputs_info) {
                if info.iotype == VertexIOType::Out {
                    graph.connect(vertex, &info.name, &info.connect_reshape(&output.index(tidx)?)?)?;
                }
            }
            for attr in &self.attributes_u32 {
                graph.set_initial_value(vertex, &attr.name, attr.value)?;
            }
            for attr in &self.attributes_f32 {
                graph.set_initial_value(vertex, &attr.name, attr.value)?;
            }
            log::trace!("{debug_name}: vertex {vertex:?} on tile {tile}");
        }
        prog.add(Program::execute(cs, debug_name));
        Ok(())
    }

    /// Allocates outputs then attaches the equation; returns the outputs.
    pub fn add(
        &self,
        graph: &mut Graph,
        prog: &mut Sequence,
        inputs: &[Tensor],
        debug_prefix: &str,
    ) -> TileResult<Vec<Tensor>> {
        self.check_inputs(&graph.target(), inputs)?;
        let outputs = self.allocate_checked(graph, inputs)?;
        self.attach_checked(graph, prog, inputs, &outputs, debug_prefix)?;
        Ok(outputs)
    }
}

/// Host primitive deserializing a [`TileMapEquation`] and adding it to the graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileMapEquationCall;

impl TileMapEquationCall {
    pub const NAME: &'static str = "tile_map_equation_call";
}

impl TilePrimitive for TileMapEquationCall {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata {
        PrimitiveMetadata::new(num_inputs)
    }

    fn program(
        &self,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let equation = TileMapEquation::from_json_str(attributes)?;
        let mut seq = Sequence::new();
        let outputs = equation.add(graph, &mut seq, inputs, debug_prefix)?;
        Ok(PrimitiveOutput::new(outputs, seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IpuType, ShapedArray};

    #[test]
    fn legacy_field_names_and_defaults() {
        let json = r#"{
            "pname": "add", "vname": "Add<float>", "tiles": [0, 1],
            "inputs_info": [], "outputs_info": [],
            "attributes_u32": [], "attributes_f32": [],
            "gp_filename": "/kernels/add.gp"
        }"#;
        let eqn = TileMapEquation::from_json_str(json).unwrap();
        assert_eq!(eqn.primitive_name, "add");
        assert_eq!(eqn.kernel_name, "Add<float>");
        assert_eq!(eqn.external_code_ref, "/kernels/add.gp");
        assert_eq!(eqn.perf_estimate, 0);

        let text = eqn.to_json_str().unwrap();
        assert!(text.contains("\"primitive_name\":\"add\""));
        assert!(text.contains("\"perf_estimate\":0"));
    }

    #[test]
    fn unset_optionals_round_trip() {
        let eqn = TileMapEquation::new("p", "K", vec![3])
            .with_external_code_ref("")
            .with_perf_estimate(0);
        let back = TileMapEquation::from_json_str(&eqn.to_json_str().unwrap()).unwrap();
        assert_eq!(back, eqn);
        assert_eq!(back.external_code_ref, "");
        assert_eq!(back.perf_estimate, 0);

        let eqn = eqn.with_perf_estimate(1).with_external_code_ref("k.gp");
        let back = TileMapEquation::from_json_str(&eqn.to_json_str().unwrap()).unwrap();
        assert_eq!(back, eqn);
    }

    #[test]
    fn validate_rejects_input_only_outputs() {
        let aval = ShapedArray::new(vec![2], IpuType::Float);
        let eqn = TileMapEquation::new("p", "K", vec![0])
            .with_outputs(vec![VertexIOInfo::input("out", aval)]);
        assert!(matches!(eqn.validate(&Target::new(4)), Err(TileError::Design(_))));
    }

    #[test]
    fn validate_rejects_duplicate_tiles_and_attributes() {
        let target = Target::new(4);
        let eqn = TileMapEquation::new("p", "K", vec![1, 1]);
        assert!(eqn.validate(&target).is_err());

        let eqn = TileMapEquation::new("p", "K", vec![1, 2]).with_attributes(
            vec![VertexAttributeU32::new("n", 1), VertexAttributeU32::new("n", 2)],
            vec![],
        );
        assert!(eqn.validate(&target).is_err());

        // Both buckets set the same vertex field.
        let eqn = TileMapEquation::new("p", "K", vec![1, 2]).with_attributes(
            vec![VertexAttributeU32::new("n", 1)],
            vec![VertexAttributeF32::new("n", 1.0)],
        );
        assert!(matches!(eqn.validate(&target), Err(TileError::Design(_))));
    }

    #[test]
    fn validate_rejects_fields_shared_between_ios_and_attributes() {
        let target = Target::new(4);
        let aval = ShapedArray::new(vec![2], IpuType::Float);
        let eqn = TileMapEquation::new("p", "K", vec![0])
            .with_inputs(vec![VertexIOInfo::input("x", aval.clone())])
            .with_outputs(vec![VertexIOInfo::output("x", aval.clone())]);
        assert!(matches!(eqn.validate(&target), Err(TileError::Design(_))));

        let eqn = TileMapEquation::new("p", "K", vec![0])
            .with_outputs(vec![VertexIOInfo::output("y", aval.clone())])
            .with_attributes(vec![], vec![VertexAttributeF32::new("y", 0.5)]);
        assert!(matches!(eqn.validate(&target), Err(TileError::Design(_))));

        // An InOut output shares its input's field.
        let eqn = TileMapEquation::new("p", "K", vec![0])
            .with_inputs(vec![VertexIOInfo::inout("x", aval.clone())])
            .with_outputs(vec![VertexIOInfo::inout("x", aval)]);
        assert!(eqn.validate(&target).is_ok());
    }

    #[test]
    fn validate_checks_constant_inputs() {
        let target = Target::new(2);
        let ok = VertexIOInfo::constant("w", IpuType::UnsignedShort, vec![2], vec![1, 0, 2, 0]);
        let eqn = TileMapEquation::new("p", "K", vec![0]).with_inputs(vec![ok.clone()]);
        assert!(eqn.validate(&target).is_ok());

        let short = VertexIOInfo::constant("w", IpuType::UnsignedShort, vec![2], vec![1, 0, 2]);
        let eqn = TileMapEquation::new("p", "K", vec![0]).with_inputs(vec![short]);
        assert!(matches!(eqn.validate(&target), Err(TileError::Design(_))));

        // Constants are not passed as tensors, so they cannot be updated in place.
        let eqn = TileMapEquation::new("p", "K", vec![0])
            .with_inputs(vec![ok])
            .with_outputs(vec![VertexIOInfo::inout("w", ShapedArray::new(vec![2], IpuType::UnsignedShort))]);
        assert!(matches!(eqn.validate(&target), Err(TileError::NameResolution { .. })));
    }
}
