use ndarray::Array2;

/// A trainable tensor together with the gradient of the last backward pass.
#[derive(Debug, Clone)]
pub struct Parameter {
    pub value: Array2<f32>,
    pub grad: Array2<f32>,
}

impl Parameter {
    pub fn new(value: Array2<f32>) -> Self {
        let grad = Array2::zeros(value.raw_dim());
        Self { value, grad }
    }
}

pub trait Optimizer {
    /// Updates every parameter in place from its current gradient.
    fn step(&mut self, params: &mut [&mut Parameter]);
}

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct Sgd {
    learning_rate: f32,
}

impl Sgd {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        let lr = self.learning_rate;
        for param in params.iter_mut() {
            param.value.scaled_add(-lr, &param.grad);
        }
    }
}

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    /// First moment estimate per parameter slot.
    m: Vec<Array2<f32>>,
    /// Second moment estimate per parameter slot.
    v: Vec<Array2<f32>>,
    t: i32,
}

impl Adam {
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    pub fn new_default(learning_rate: f32) -> Self {
        Self::new(learning_rate, 0.9, 0.999, 1e-7)
    }

    /// Moment buffers are keyed by position, so callers must pass parameters in a stable order.
    fn ensure_state(&mut self, params: &[&mut Parameter]) {
        let stale = self.m.len() != params.len()
            || self.m.iter().zip(params.iter()).any(|(m, p)| m.dim() != p.value.dim());
        if stale {
            self.m = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.v = params.iter().map(|p| Array2::zeros(p.value.raw_dim())).collect();
            self.t = 0;
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Parameter]) {
        self.ensure_state(params);
        self.t += 1;

        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.t);
        let bias_correction2 = 1.0 - beta2.powi(self.t);
        let step_size = self.learning_rate * bias_correction2.sqrt() / bias_correction1;

        for ((param, m), v) in params.iter_mut().zip(self.m.iter_mut()).zip(self.v.iter_mut()) {
            ndarray::Zip::from(&mut param.value)
                .and(&param.grad)
                .and(m)
                .and(v)
                .for_each(|w, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *w -= step_size * *m / (v.sqrt() + epsilon);
                });
        }
    }
}
