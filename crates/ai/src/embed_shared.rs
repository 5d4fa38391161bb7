use plastmem_shared::AppError;

/// Target dimension for embeddings.
const TARGET_DIM: usize = 1024;
/// Threshold for determining if L2 normalization is needed.
const L2_NORM_TOLERANCE: f32 = 1e-6;

/// Process embedding vector to ensure it's L2 normalized with exactly 1024 dimensions.
///
/// - If dim > 1024: truncate to 1024 and L2 normalize
/// - If dim == 1024: check if already L2 normalized, normalize if not
/// - If dim < 1024: return error
pub fn process_embedding(mut vec: Vec<f32>) -> Result<Vec<f32>, AppError> {
  match vec.len() {
    d if d > TARGET_DIM => {
      vec.truncate(TARGET_DIM);
      l2_normalize(&mut vec);
      Ok(vec)
    }
    d if d == TARGET_DIM => {
      let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
      if (norm_sq - 1.0).abs() > L2_NORM_TOLERANCE {
        l2_normalize(&mut vec);
      }
      Ok(vec)
    }
    d => Err(AppError::new(anyhow::anyhow!(
      "embedding dimension {} is less than required {}",
      d,
      TARGET_DIM
    ))),
  }
}

/// L2 normalize a vector in-place.
fn l2_normalize(vec: &mut [f32]) {
  let norm_sq: f32 = vec.iter().map(|x| x * x).sum();
  let norm = norm_sq.sqrt();
  if norm > 1e-12 {
    for x in vec.iter_mut() {
      *x /= norm;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_already_sized_vector() {
    let mut v = vec![0.0_f32; TARGET_DIM];
    v[0] = 3.0;
    v[1] = 4.0;
    let out = process_embedding(v).unwrap();
    let norm: f32 = out.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
  }

  #[test]
  fn rejects_short_vector() {
    assert!(process_embedding(vec![1.0, 2.0]).is_err());
  }

  #[test]
  fn truncates_oversized_vector() {
    let v = vec![1.0_f32; 2048];
    let out = process_embedding(v).unwrap();
    assert_eq!(out.len(), TARGET_DIM);
  }
}
