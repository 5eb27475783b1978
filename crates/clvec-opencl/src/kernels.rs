//! OpenCL C source for the vector-add kernel.

/// Entry point compiled from [`VECTOR_ADD_SRC`].
pub const VECTOR_ADD_ENTRY: &str = "vector_add";

/// Positional kernel arguments, in binding order.
pub const ARG_A: u32 = 0;
pub const ARG_B: u32 = 1;
pub const ARG_C: u32 = 2;
pub const ARG_COUNT: u32 = 3;

/// `c[i] = a[i] + b[i]` for `i < count`.
pub const VECTOR_ADD_SRC: &str = r"
__kernel void vector_add(__global const float *a,
                         __global const float *b,
                         __global float *c,
                         const unsigned int count)
{
    size_t i = get_global_id(0);
    if (i < count) {
        c[i] = a[i] + b[i];
    }
}
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_defines_entry_point() {
        assert!(VECTOR_ADD_SRC.contains(&format!("__kernel void {VECTOR_ADD_ENTRY}(")));
    }

    #[test]
    fn source_is_bounds_checked() {
        assert!(VECTOR_ADD_SRC.contains("if (i < count)"));
    }

    #[test]
    fn argument_order_is_a_b_c_count() {
        assert_eq!([ARG_A, ARG_B, ARG_C, ARG_COUNT], [0, 1, 2, 3]);
    }
}
