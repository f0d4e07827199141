use itertools::Itertools;
use ndarray::{Array2, ArrayView2, Axis};
use ndarray_rand::{rand_distr::Uniform, RandomExt};
use rand::Rng;

use crate::encoder::Encoder;
use crate::error::{DecError, Result};
use crate::optimizer::Parameter;
use crate::proto::{ActivationKind, DenseLayerProto, Matrix, NetworkProto};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Relu,
    Sigmoid,
}

impl Activation {
    fn apply(&self, x: &mut Array2<f32>) {
        match self {
            Activation::Identity => {}
            Activation::Relu => x.mapv_inplace(|v| v.max(0.0)),
            Activation::Sigmoid => x.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp())),
        }
    }

    /// Derivative expressed through the activation output.
    fn derivative(&self, output: f32) -> f32 {
        match self {
            Activation::Identity => 1.0,
            Activation::Relu => {
                if output > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Sigmoid => output * (1.0 - output),
        }
    }
}

impl From<Activation> for ActivationKind {
    fn from(activation: Activation) -> Self {
        match activation {
            Activation::Identity => ActivationKind::Identity,
            Activation::Relu => ActivationKind::Relu,
            Activation::Sigmoid => ActivationKind::Sigmoid,
        }
    }
}

impl From<ActivationKind> for Activation {
    fn from(kind: ActivationKind) -> Self {
        match kind {
            ActivationKind::Identity => Activation::Identity,
            ActivationKind::Relu => Activation::Relu,
            ActivationKind::Sigmoid => Activation::Sigmoid,
        }
    }
}

pub fn matrix_to_proto(matrix: &Array2<f32>) -> Matrix {
    Matrix {
        rows: matrix.nrows() as u32,
        cols: matrix.ncols() as u32,
        values: matrix.iter().copied().collect_vec(),
    }
}

pub fn matrix_from_proto(matrix: &Matrix) -> Result<Array2<f32>> {
    let shape = (matrix.rows as usize, matrix.cols as usize);
    Array2::from_shape_vec(shape, matrix.values.clone())
        .map_err(|_| DecError::shape("matrix payload", &[shape.0 * shape.1], &[matrix.values.len()]))
}

/// Fully connected layer `activation(x · W + b)`.
#[derive(Debug, Clone)]
pub struct Dense {
    pub weights: Parameter,
    pub bias: Parameter,
    pub activation: Activation,
    input: Option<Array2<f32>>,
    output: Option<Array2<f32>>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias.
    pub fn new<R: Rng>(input_dim: usize, output_dim: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = Array2::random_using((input_dim, output_dim), Uniform::new_inclusive(-limit, limit), rng);
        Self::from_parts(weights, Array2::zeros((1, output_dim)), activation)
    }

    pub fn from_parts(weights: Array2<f32>, bias: Array2<f32>, activation: Activation) -> Self {
        Self {
            weights: Parameter::new(weights),
            bias: Parameter::new(bias),
            activation,
            input: None,
            output: None,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.value.nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weights.value.ncols()
    }

    pub fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_dim() {
            return Err(DecError::shape(
                "dense layer input",
                &[inputs.nrows(), self.input_dim()],
                &[inputs.nrows(), inputs.ncols()],
            ));
        }
        let mut output = inputs.dot(&self.weights.value) + &self.bias.value;
        self.activation.apply(&mut output);
        Ok(output)
    }

    pub fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let output = self.predict(inputs)?;
        self.input = Some(inputs.to_owned());
        self.output = Some(output.clone());
        Ok(output)
    }

    /// Stores the parameter gradients and returns the gradient w.r.t. the layer input.
    pub fn backward(&mut self, grad_output: ArrayView2<f32>) -> Result<Array2<f32>> {
        let (input, output) = match (&self.input, &self.output) {
            (Some(input), Some(output)) => (input, output),
            _ => return Err(DecError::NotInitialized("dense layer backward")),
        };
        if grad_output.dim() != output.dim() {
            return Err(DecError::shape(
                "dense layer gradient",
                &[output.nrows(), output.ncols()],
                &[grad_output.nrows(), grad_output.ncols()],
            ));
        }

        let activation = self.activation;
        let mut grad_pre = grad_output.to_owned();
        ndarray::Zip::from(&mut grad_pre)
            .and(output)
            .for_each(|g, &o| *g *= activation.derivative(o));

        self.weights.grad = input.t().dot(&grad_pre);
        self.bias.grad = grad_pre.sum_axis(Axis(0)).insert_axis(Axis(0));
        Ok(grad_pre.dot(&self.weights.value.t()))
    }

    fn to_proto(&self) -> DenseLayerProto {
        DenseLayerProto {
            weights: Some(matrix_to_proto(&self.weights.value)),
            bias: self.bias.value.iter().copied().collect_vec(),
            activation: ActivationKind::from(self.activation) as i32,
        }
    }

    fn from_proto(proto: &DenseLayerProto) -> Result<Self> {
        let weights = proto
            .weights
            .as_ref()
            .ok_or(DecError::EmptyInput("dense layer weights"))
            .and_then(matrix_from_proto)?;
        if proto.bias.len() != weights.ncols() {
            return Err(DecError::shape("dense layer bias", &[weights.ncols()], &[proto.bias.len()]));
        }
        let bias = Array2::from_shape_vec((1, proto.bias.len()), proto.bias.clone())
            .map_err(|_| DecError::shape("dense layer bias", &[weights.ncols()], &[proto.bias.len()]))?;
        Ok(Self::from_parts(weights, bias, proto.activation().into()))
    }
}

/// A stack of dense layers.
#[derive(Debug, Clone)]
pub struct DenseNetwork {
    pub layers: Vec<Dense>,
}

impl DenseNetwork {
    /// `dims` lists the layer widths from input to output; every layer but the last uses
    /// `hidden_activation`.
    pub fn new<R: Rng>(
        dims: &[usize],
        hidden_activation: Activation,
        output_activation: Activation,
        rng: &mut R,
    ) -> Result<Self> {
        if dims.len() < 2 {
            return Err(DecError::invalid("dims", "a network needs an input and an output width"));
        }
        if dims.iter().any(|&d| d == 0) {
            return Err(DecError::invalid("dims", "layer widths must be positive"));
        }

        let last = dims.len() - 2;
        let layers = dims
            .iter()
            .tuple_windows()
            .enumerate()
            .map(|(idx, (&input_dim, &output_dim))| {
                let activation = if idx == last { output_activation } else { hidden_activation };
                Dense::new(input_dim, output_dim, activation, &mut *rng)
            })
            .collect();
        Ok(Self { layers })
    }

    pub fn output_dim(&self) -> usize {
        self.layers.last().map(Dense::output_dim).unwrap_or(0)
    }

    pub fn backward_to_input(&mut self, grad_output: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut grad = grad_output.to_owned();
        for layer in self.layers.iter_mut().rev() {
            grad = layer.backward(grad.view())?;
        }
        Ok(grad)
    }

    pub fn to_proto(&self) -> NetworkProto {
        NetworkProto {
            layers: self.layers.iter().map(Dense::to_proto).collect(),
        }
    }

    pub fn from_proto(proto: &NetworkProto) -> Result<Self> {
        let layers = proto.layers.iter().map(Dense::from_proto).collect::<Result<Vec<_>>>()?;
        if layers.is_empty() {
            return Err(DecError::EmptyInput("network layers"));
        }
        for (a, b) in layers.iter().tuple_windows() {
            if a.output_dim() != b.input_dim() {
                return Err(DecError::shape("stacked layers", &[a.output_dim()], &[b.input_dim()]));
            }
        }
        Ok(Self { layers })
    }
}

impl Encoder for DenseNetwork {
    fn input_dim(&self) -> usize {
        self.layers.first().map(Dense::input_dim).unwrap_or(0)
    }

    fn embedding_dim(&self) -> usize {
        self.output_dim()
    }

    fn predict(&self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut activations = inputs.to_owned();
        for layer in &self.layers {
            activations = layer.predict(activations.view())?;
        }
        Ok(activations)
    }

    fn forward(&mut self, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut activations = inputs.to_owned();
        for layer in self.layers.iter_mut() {
            activations = layer.forward(activations.view())?;
        }
        Ok(activations)
    }

    fn backward(&mut self, grad_embeddings: ArrayView2<f32>) -> Result<()> {
        self.backward_to_input(grad_embeddings).map(|_| ())
    }

    fn parameters_mut(&mut self) -> Vec<&mut Parameter> {
        self.layers
            .iter_mut()
            .flat_map(|layer| [&mut layer.weights, &mut layer.bias])
            .collect()
    }
}
