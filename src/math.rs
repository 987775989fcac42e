/// Row-major 2-D matrix behind the products of both layer variants. The
/// convolution lowers to the same products through im2col.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(data.len(), rows * cols, "matrix data does not fit {rows}x{cols}");
        Matrix { rows, cols, data }
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    /// `a · b`. Zero entries of `a` are skipped, which pays off for masked
    /// kernels and padded im2col rows.
    pub fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
        assert_eq!(a.cols, b.rows);
        let mut out = Matrix::zeros(a.rows, b.cols);
        for i in 0..a.rows {
            let out_row = &mut out.data[i * b.cols..(i + 1) * b.cols];
            for (k, &a_val) in a.row(i).iter().enumerate() {
                if a_val == 0.0 {
                    continue;
                }
                for (o, &bv) in out_row.iter_mut().zip(b.row(k)) {
                    *o += a_val * bv;
                }
            }
        }
        out
    }

    /// `aᵀ · b` without materializing the transpose.
    pub fn tr_matmul(a: &Matrix, b: &Matrix) -> Matrix {
        assert_eq!(a.rows, b.rows);
        let mut out = Matrix::zeros(a.cols, b.cols);
        for k in 0..a.rows {
            let b_row = b.row(k);
            for (i, &a_val) in a.row(k).iter().enumerate() {
                if a_val == 0.0 {
                    continue;
                }
                let out_row = &mut out.data[i * b.cols..(i + 1) * b.cols];
                for (o, &bv) in out_row.iter_mut().zip(b_row) {
                    *o += a_val * bv;
                }
            }
        }
        out
    }

    /// `a · bᵀ` without materializing the transpose.
    pub fn matmul_tr(a: &Matrix, b: &Matrix) -> Matrix {
        assert_eq!(a.cols, b.cols);
        let mut out = Matrix::zeros(a.rows, b.rows);
        for i in 0..a.rows {
            let a_row = a.row(i);
            for j in 0..b.rows {
                let dot: f32 = a_row.iter().zip(b.row(j)).map(|(x, y)| x * y).sum();
                out.data[i * b.rows + j] = dot;
            }
        }
        out
    }

    /// Row-wise softmax, shifted by the row maximum.
    pub fn softmax_rows(&self) -> Matrix {
        let mut out = self.clone();
        for row in out.data.chunks_mut(self.cols.max(1)) {
            let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            row.iter_mut().for_each(|v| *v /= sum);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matmul_small() {
        let a = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let b = Matrix::from_vec(2, 1, vec![1.0, 1.0]);
        assert_eq!(Matrix::matmul(&a, &b).data, vec![3.0, 7.0]);
    }

    #[test]
    fn transposed_products_agree() {
        let a = Matrix::from_vec(2, 3, vec![1.0, 2.0, 0.0, -1.0, 5.0, 6.0]);
        let b = Matrix::from_vec(2, 2, vec![0.5, 1.0, 2.0, -3.0]);
        // aᵀ·b is 3x2
        assert_eq!(
            Matrix::tr_matmul(&a, &b).data,
            vec![-1.5, 4.0, 11.0, -13.0, 12.0, -18.0]
        );
        // a·aᵀ is 2x2
        assert_eq!(Matrix::matmul_tr(&a, &a).data, vec![5.0, 9.0, 9.0, 62.0]);
    }

    #[test]
    fn softmax_rows_normalize() {
        let m = Matrix::from_vec(2, 2, vec![0.0, 0.0, 1000.0, 1000.0]).softmax_rows();
        assert_eq!(m.data, vec![0.5, 0.5, 0.5, 0.5]);
    }
}
