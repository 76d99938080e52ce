// Fixed-width float blocks for the latent-factor loops.
// Every operation works block by block over W floats and finishes any tail
// with scalar code, so results only differ from a plain loop by reassociation.

pub struct VectorLane<const W: usize>;

impl<const W: usize> VectorLane<W> {
    pub const WIDTH: usize = W;

    /// dst += src
    #[inline(always)]
    pub fn add_assign(dst: &mut [f32], src: &[f32]) {
        debug_assert_eq!(dst.len(), src.len());
        let mut dst_blocks = dst.chunks_exact_mut(W);
        let mut src_blocks = src.chunks_exact(W);
        for (d, s) in (&mut dst_blocks).zip(&mut src_blocks) {
            for l in 0..W {
                d[l] += s[l];
            }
        }
        for (d, s) in dst_blocks.into_remainder().iter_mut().zip(src_blocks.remainder()) {
            *d += *s;
        }
    }

    /// dst += src * scale
    #[inline(always)]
    pub fn mul_add(dst: &mut [f32], src: &[f32], scale: f32) {
        debug_assert_eq!(dst.len(), src.len());
        let mut dst_blocks = dst.chunks_exact_mut(W);
        let mut src_blocks = src.chunks_exact(W);
        for (d, s) in (&mut dst_blocks).zip(&mut src_blocks) {
            for l in 0..W {
                d[l] += s[l] * scale;
            }
        }
        for (d, s) in dst_blocks.into_remainder().iter_mut().zip(src_blocks.remainder()) {
            *d += *s * scale;
        }
    }

    /// dst = src * scale
    #[inline(always)]
    pub fn scaled_copy(dst: &mut [f32], src: &[f32], scale: f32) {
        debug_assert_eq!(dst.len(), src.len());
        let mut dst_blocks = dst.chunks_exact_mut(W);
        let mut src_blocks = src.chunks_exact(W);
        for (d, s) in (&mut dst_blocks).zip(&mut src_blocks) {
            for l in 0..W {
                d[l] = s[l] * scale;
            }
        }
        for (d, s) in dst_blocks.into_remainder().iter_mut().zip(src_blocks.remainder()) {
            *d = *s * scale;
        }
    }

    /// dst = x * a - y * b
    #[inline(always)]
    pub fn sub_scaled(dst: &mut [f32], x: &[f32], a: f32, y: &[f32], b: f32) {
        debug_assert_eq!(dst.len(), x.len());
        debug_assert_eq!(dst.len(), y.len());
        let mut dst_blocks = dst.chunks_exact_mut(W);
        let mut x_blocks = x.chunks_exact(W);
        let mut y_blocks = y.chunks_exact(W);
        for ((d, xs), ys) in (&mut dst_blocks).zip(&mut x_blocks).zip(&mut y_blocks) {
            for l in 0..W {
                d[l] = xs[l] * a - ys[l] * b;
            }
        }
        for ((d, xs), ys) in dst_blocks.into_remainder().iter_mut().zip(x_blocks.remainder()).zip(y_blocks.remainder()) {
            *d = *xs * a - *ys * b;
        }
    }

    /// Sum of a[i] * b[i], accumulated in W independent partial sums.
    #[inline(always)]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let mut wsumbuf = [0.0f32; W];
        let mut a_blocks = a.chunks_exact(W);
        let mut b_blocks = b.chunks_exact(W);
        for (x, y) in (&mut a_blocks).zip(&mut b_blocks) {
            for l in 0..W {
                wsumbuf[l] += x[l] * y[l];
            }
        }
        let mut sum: f32 = wsumbuf.iter().sum();
        for (x, y) in a_blocks.remainder().iter().zip(b_blocks.remainder()) {
            sum += x * y;
        }
        sum
    }
}

/// Widest lane that divides num_factor evenly, falling back to scalar blocks.
pub fn select_lane_width(num_factor: usize) -> usize {
    if num_factor % 8 == 0 {
        8
    } else if num_factor % 4 == 0 {
        4
    } else {
        1
    }
}

// Binds $lane to the VectorLane type matching the runtime width, so the block is monomorphized per width
#[macro_export]
macro_rules! specialize_lane {
    ( $width_expr:expr,
      $lane:ident,
      $code_block:block ) => {
        match $width_expr {
            8 => { type $lane = $crate::vector_lane::VectorLane<8>; $code_block },
            4 => { type $lane = $crate::vector_lane::VectorLane<4>; $code_block },
            _ => { type $lane = $crate::vector_lane::VectorLane<1>; $code_block },
        }
    };
}

#[macro_export]
macro_rules! assert_epsilon {
    ($x:expr, $y:expr) => {
        let x = $x; // Make sure we evaluate only once
        let y = $y;
        if !(x - y < 0.000005 && y - x < 0.000005) {
            println!("Expectation: {}, Got: {}", y, x);
            panic!();
        }
    };
}
