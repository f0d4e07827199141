use ndarray::ArrayView1;
use num_traits::Float;

pub fn squared_euclidian_distance<F: Float>(us: ArrayView1<F>, them: ArrayView1<F>) -> F {
    us.iter()
        .zip(them.iter())
        .fold(F::zero(), |acc, (&a, &b)| {
            let diff = a - b;
            acc + diff * diff
        })
}

pub fn euclidian_distance<F: Float>(us: ArrayView1<F>, them: ArrayView1<F>) -> F {
    squared_euclidian_distance(us, them).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn three_four_five() {
        let a = array![0.0f32, 0.0];
        let b = array![3.0f32, 4.0];
        assert_eq!(squared_euclidian_distance(a.view(), b.view()), 25.0);
        assert_eq!(euclidian_distance(a.view(), b.view()), 5.0);
    }

    #[test]
    fn distance_to_self_is_zero() {
        let a = array![1.5f64, -2.0, 7.25];
        assert_eq!(euclidian_distance(a.view(), a.view()), 0.0);
    }
}
