//! Small arithmetic helpers shared by the coordinate algebra and the container schema.

/// Rounds `dividend / divisor` up to the nearest integer. Used to compute how many
/// tiles are needed along an axis whose `size` is not a multiple of its `tile_size`.
pub fn ceil_div(dividend: usize, divisor: usize) -> usize {
    debug_assert_ne!(divisor, 0);
    (dividend + divisor - 1) / divisor
}

/// Computes the exclusive prefix product of `values`: `result[i] = Π values[0..i]`.
/// Axis 0 therefore always carries weight 1, matching "the first axis varies fastest" (§4.4).
pub fn exclusive_prefix_product(values: &[usize]) -> Vec<usize> {
    let mut products = Vec::with_capacity(values.len());
    let mut running = 1usize;

    for &value in values {
        products.push(running);
        running *= value;
    }

    products
}
