//! Class weights of the recycling taxonomy.

/// Per-class weights in palette order (background, plastic, paper, bio,
/// metal, other). Rarer classes get larger weights.
pub const RECYCLING_CLASS_WEIGHTS: [f32; 6] = [6.5, 7.0, 15.0, 40.0, 10.0, 7.0];

/// Scale weights so they sum to one.
///
/// # Panics
///
/// Panics if the weights do not have a positive sum.
pub fn normalized(weights: &[f32]) -> Vec<f32> {
    let total: f32 = weights.iter().sum();
    assert!(total > 0.0, "Class weights must have a positive sum, got {total}");
    weights.iter().map(|w| w / total).collect()
}
