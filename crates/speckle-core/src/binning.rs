//! Mask-aware downsampling of detector frames.
//!
//! Both operators aggregate `factor × factor` blocks ("integrate" mode).
//! Pixels whose mask carries any of `bad_bits` are left out of the
//! aggregate; mask bits of the block are OR-ed into the output mask. When a
//! frame does not divide evenly, the missing edge pixels count as `MISSING`.
//! A block with fewer than `min_valid` usable pixels is flagged `INVALID`.

use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;

use crate::detection::PixelMask;

struct Block {
    mask: u16,
    valid: usize,
}

fn for_each_block<T: Copy>(
    data: &ArrayView2<'_, T>,
    mask: &ArrayView2<'_, u16>,
    factor: usize,
    bad_bits: u16,
    mut visit: impl FnMut((usize, usize), T),
) -> Array2<Block> {
    let (ny, nx) = data.dim();
    let (by, bx) = (ny.div_ceil(factor), nx.div_ceil(factor));
    Array2::from_shape_fn((by, bx), |(oy, ox)| {
        let mut block = Block { mask: 0, valid: 0 };
        for iy in oy * factor..(oy + 1) * factor {
            for ix in ox * factor..(ox + 1) * factor {
                if iy >= ny || ix >= nx {
                    block.mask |= PixelMask::MISSING;
                    continue;
                }
                let m = mask[[iy, ix]];
                block.mask |= m;
                if m & bad_bits == 0 {
                    block.valid += 1;
                    visit((oy, ox), data[[iy, ix]]);
                }
            }
        }
        block
    })
}

fn finish_mask(blocks: &Array2<Block>, min_valid: usize) -> Array2<u16> {
    blocks.map(|b| {
        if b.valid < min_valid {
            b.mask | PixelMask::INVALID
        } else {
            b.mask
        }
    })
}

/// Sum intensities over valid pixels of each block; blocks below
/// `min_valid` are zero.
pub fn bin_intensity(
    data: &ArrayView2<'_, f64>,
    mask: &ArrayView2<'_, u16>,
    factor: usize,
    bad_bits: u16,
    min_valid: usize,
) -> (Array2<f64>, Array2<u16>) {
    let factor = factor.max(1);
    let (ny, nx) = data.dim();
    let mut sums = Array2::zeros((ny.div_ceil(factor), nx.div_ceil(factor)));
    let blocks = for_each_block(data, mask, factor, bad_bits, |idx, v| sums[idx] += v);
    let out_mask = finish_mask(&blocks, min_valid);
    for (s, b) in sums.iter_mut().zip(blocks.iter()) {
        if b.valid < min_valid {
            *s = 0.0;
        }
    }
    (sums, out_mask)
}

/// Downsample a complex amplitude consistently with [`bin_intensity`]:
/// the magnitude is $\sqrt{\sum |F|^2}$ over valid pixels, so that
/// $|F_{binned}|^2$ equals the binned intensity, and the phase is that of
/// the coherent sum $\sum F$. Blocks below `min_valid` are zero.
pub fn bin_amplitude(
    data: &ArrayView2<'_, Complex64>,
    mask: &ArrayView2<'_, u16>,
    factor: usize,
    bad_bits: u16,
    min_valid: usize,
) -> (Array2<Complex64>, Array2<u16>) {
    let factor = factor.max(1);
    let (ny, nx) = data.dim();
    let shape = (ny.div_ceil(factor), nx.div_ceil(factor));
    let mut energy = Array2::<f64>::zeros(shape);
    let mut coherent = Array2::<Complex64>::zeros(shape);
    let blocks = for_each_block(data, mask, factor, bad_bits, |idx, v| {
        energy[idx] += v.norm_sqr();
        coherent[idx] += v;
    });
    let out_mask = finish_mask(&blocks, min_valid);
    let mut out = Array2::zeros(shape);
    for (((o, e), c), b) in out
        .iter_mut()
        .zip(energy.iter())
        .zip(coherent.iter())
        .zip(blocks.iter())
    {
        if b.valid >= min_valid {
            *o = Complex64::from_polar(e.sqrt(), c.arg());
        }
    }
    (out, out_mask)
}
