use ndarray::{Array1, ArrayView1};

/// Running mean of the points assigned to one cluster.
pub trait Centroid: Sized + Clone {
    fn update_centroid(&mut self, data_point: ArrayView1<f32>);
    fn finalize_centroid(&mut self, count: usize);
}

impl Centroid for Array1<f64> {
    fn update_centroid(&mut self, data_point: ArrayView1<f32>) {
        if self.is_empty() {
            *self = Array1::zeros(data_point.len());
        }

        for (a, &b) in self.iter_mut().zip(data_point.iter()) {
            *a += b as f64;
        }
    }

    fn finalize_centroid(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        let count = count as f64;
        self.mapv_inplace(|a| a / count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn mean_of_points() {
        let mut centroid: Array1<f64> = Array1::zeros(0);
        centroid.update_centroid(array![1.0f32, 2.0].view());
        centroid.update_centroid(array![3.0f32, 6.0].view());
        centroid.finalize_centroid(2);
        assert_eq!(centroid, array![2.0, 4.0]);
    }
}
