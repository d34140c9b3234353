//! Neural Network inference.
//!
//! [`NeuralNetwork`] wraps an ONNX model loaded and optimized by [`tract_onnx`]. Code that only
//! needs to run a model goes through the [`LandmarkModel`] trait instead, so that tests and other
//! inference backends can stand in for it.
//!
//! Models are typically loaded off the frame-processing thread, since optimizing a network can
//! take a while. [`ModelSlot`] holds the model once it is available; until then, frames are
//! skipped.

pub mod tensor;

use std::{
    borrow::Cow,
    io,
    ops::Index,
    path::Path,
    sync::{Arc, OnceLock},
    thread::{self, JoinHandle},
};

use anyhow::Context;
use tensor::Tensor;
use tract_onnx::prelude::{
    tvec, Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Trait for synchronous inference backends that turn one input tensor into a fixed set of
/// output tensors.
pub trait LandmarkModel: Send + Sync + 'static {
    /// Runs inference on `input`, returning the estimated outputs.
    fn infer(&self, input: &Tensor) -> anyhow::Result<Outputs>;
}

impl<M: LandmarkModel + ?Sized> LandmarkModel for Arc<M> {
    fn infer(&self, input: &Tensor) -> anyhow::Result<Outputs> {
        (**self).infer(input)
    }
}

/// Neural network loader.
pub struct Loader<'a> {
    model_data: Cow<'a, [u8]>,
    outputs: Option<Vec<usize>>,
}

impl<'a> Loader<'a> {
    fn new(data: Cow<'a, [u8]>) -> Self {
        Self {
            model_data: data,
            outputs: None,
        }
    }

    /// Only compute the specified outputs during inference.
    ///
    /// This takes a list of [`usize`]s corresponding to network output indices. When called, the
    /// [`Outputs`] returned from [`NeuralNetwork::estimate`] will only contain the chosen output
    /// tensors, in the order given here.
    ///
    /// The MediaPipe hand landmark network has 4 outputs: screen landmarks, presence, handedness
    /// and world landmarks. The world landmarks are not needed for the overlay, so `[0, 1, 2]`
    /// saves a bit of work.
    pub fn with_output_selection<O>(mut self, outputs: O) -> Self
    where
        O: Into<Vec<usize>>,
    {
        self.outputs = Some(outputs.into());
        self
    }

    /// Loads and optimizes the network.
    ///
    /// Returns an error if the network data is malformed, if the network data is incomplete, if
    /// the network uses unimplemented operations, or if an output selection refers to outputs the
    /// network doesn't have.
    pub fn load(self) -> anyhow::Result<NeuralNetwork> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*self.model_data)?
            .into_optimized()?;
        let outputs = graph.output_outlets()?;
        let selected_outputs = match self.outputs {
            Some(indices) => indices
                .iter()
                .map(|&i| {
                    outputs.get(i).copied().with_context(|| {
                        format!("network has {} outputs, cannot select #{i}", outputs.len())
                    })
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            None => outputs.to_vec(),
        };
        let model = SimplePlan::new_for_outputs(graph, &selected_outputs)?;

        Ok(NeuralNetwork(Arc::new(model)))
    }
}

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<'a, P: AsRef<Path>>(path: P) -> anyhow::Result<Loader<'a>> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl<'a>(path: &Path) -> anyhow::Result<Loader<'a>> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file must have `.onnx` extension (got '{}')",
                path.display()
            ),
        }

        let model_data =
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        Ok(Loader::new(model_data.into()))
    }

    /// Loads a pre-trained model from an in-memory ONNX file.
    pub fn from_onnx(raw: &[u8]) -> Loader<'_> {
        Loader::new(raw.into())
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the number of (selected) output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.model().outputs.len()
    }

    /// Returns the concrete shape of the input at `index`.
    ///
    /// Returns an error if there is no such input, or if its shape is symbolic.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .with_context(|| format!("network input #{index} has a symbolic shape"))?;
        Ok(shape.to_vec())
    }

    /// Checks that the network takes a single input tensor of shape `expected`.
    pub fn check_input(&self, expected: &[usize]) -> anyhow::Result<()> {
        if self.num_inputs() != 1 {
            anyhow::bail!("expected a network with 1 input, got {}", self.num_inputs());
        }
        let shape = self.input_shape(0)?;
        if shape != expected {
            anyhow::bail!("network input has shape {shape:?}, expected {expected:?}");
        }
        Ok(())
    }

    /// Runs the network on a set of [`Inputs`], returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &Inputs) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.run(inputs)?;
        let outputs = outputs
            .iter()
            .map(|tract| Tensor::from_tract(tract))
            .collect::<anyhow::Result<_>>()?;
        Ok(Outputs { inner: outputs })
    }
}

impl LandmarkModel for NeuralNetwork {
    fn infer(&self, input: &Tensor) -> anyhow::Result<Outputs> {
        self.estimate(&Inputs::from(input.clone()))
    }
}

/// A shared slot that holds a [`LandmarkModel`] once it has been loaded.
///
/// Cloning a [`ModelSlot`] yields another handle to the same slot.
pub struct ModelSlot<M> {
    model: Arc<OnceLock<M>>,
}

impl<M> Clone for ModelSlot<M> {
    fn clone(&self) -> Self {
        Self {
            model: self.model.clone(),
        }
    }
}

impl<M> Default for ModelSlot<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M> ModelSlot<M> {
    /// Creates a slot that has no model yet.
    pub fn empty() -> Self {
        Self {
            model: Arc::new(OnceLock::new()),
        }
    }

    /// Creates a slot that already holds `model`.
    pub fn loaded(model: M) -> Self {
        let slot = Self::empty();
        slot.set(model);
        slot
    }

    /// Places `model` in the slot.
    ///
    /// Returns `false` and drops `model` if the slot was already filled.
    pub fn set(&self, model: M) -> bool {
        self.model.set(model).is_ok()
    }

    /// Returns the model, or [`None`] if it has not been loaded yet.
    pub fn get(&self) -> Option<&M> {
        self.model.get()
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }
}

impl<M: Send + Sync + 'static> ModelSlot<M> {
    /// Runs `load` on a background thread named `name` and fills the slot with its result.
    ///
    /// If `load` fails, the error is logged and the slot stays empty, so frames will keep being
    /// skipped.
    pub fn load_in_background<F>(&self, name: &str, load: F) -> io::Result<JoinHandle<()>>
    where
        F: FnOnce() -> anyhow::Result<M> + Send + 'static,
    {
        let slot = self.clone();
        let name = name.to_string();
        thread::Builder::new()
            .name(format!("{name} loader"))
            .spawn(move || match load() {
                Ok(model) => {
                    if slot.set(model) {
                        log::info!("model '{name}' loaded");
                    } else {
                        log::warn!("model '{name}' was already loaded, discarding new instance");
                    }
                }
                Err(e) => log::error!("failed to load model '{name}': {e:#}"),
            })
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug, Clone)]
pub struct Outputs {
    inner: TVec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the output tensor at `index`, or [`None`] if the network produced fewer outputs.
    pub fn get(&self, index: usize) -> Option<&Tensor> {
        self.inner.get(index)
    }

    /// Returns an iterator over the output tensors.
    pub fn iter(&self) -> std::slice::Iter<'_, Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Outputs {
    type Item = &'a Tensor;
    type IntoIter = std::slice::Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// List of input tensors for neural network inference.
#[derive(Debug)]
pub struct Inputs {
    inner: TVec<Tensor>,
}

impl Inputs {
    fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl From<Tensor> for Inputs {
    fn from(t: Tensor) -> Self {
        Self { inner: tvec![t] }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Constant(f32);

    impl LandmarkModel for Constant {
        fn infer(&self, _: &Tensor) -> anyhow::Result<Outputs> {
            Ok([Tensor::from(self.0)].into_iter().collect())
        }
    }

    #[test]
    fn rejects_non_onnx_path() {
        let err = NeuralNetwork::from_path("hand_landmark.tflite")
            .err()
            .unwrap();
        assert!(err.to_string().contains("`.onnx` extension"), "{err}");
    }

    #[test]
    fn rejects_garbage_model() {
        assert!(NeuralNetwork::from_onnx(b"definitely not protobuf")
            .load()
            .is_err());
    }

    #[test]
    fn slot_starts_empty() {
        let slot = ModelSlot::<Constant>::empty();
        assert!(!slot.is_loaded());
        assert!(slot.get().is_none());

        let other = slot.clone();
        assert!(other.set(Constant(1.0)));
        assert!(!other.set(Constant(2.0)));
        assert_eq!(slot.get().unwrap().0, 1.0);
    }

    #[test]
    fn background_load() {
        let slot = ModelSlot::empty();
        slot.load_in_background("constant", || {
            thread::sleep(Duration::from_millis(10));
            Ok(Constant(0.5))
        })
        .unwrap()
        .join()
        .unwrap();

        let outputs = slot.get().unwrap().infer(&Tensor::from(0.0)).unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].first(), Some(0.5));
    }

    #[test]
    fn background_load_failure_leaves_slot_empty() {
        let slot = ModelSlot::<Constant>::empty();
        slot.load_in_background("broken", || anyhow::bail!("no such file"))
            .unwrap()
            .join()
            .unwrap();
        assert!(!slot.is_loaded());
    }
}
