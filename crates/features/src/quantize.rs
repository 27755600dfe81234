//! Bit-code quantizers for surface normals and gradient orientations

/// Number of gradient orientation bins over [0°, 180°)
pub const GRADIENT_BIN_COUNT: u32 = 5;

const NORMAL_LUT_SIZE: usize = 20;

/// Upper-hemisphere octant codes looked up from the two tangent-slope
/// components of the unit normal. Rows index the y component, columns the x
/// component, both mapped from [-1, 1] onto the 20-cell axis.
#[rustfmt::skip]
const NORMAL_LUT: [[u8; NORMAL_LUT_SIZE]; NORMAL_LUT_SIZE] = [
    [32, 32, 32, 32, 32, 32, 64, 64, 64, 64, 64, 64,  64,  64,  64,  128, 128, 128, 128, 128],
    [32, 32, 32, 32, 32, 32, 32, 64, 64, 64, 64, 64,  64,  64,  128, 128, 128, 128, 128, 128],
    [32, 32, 32, 32, 32, 32, 32, 64, 64, 64, 64, 64,  64,  64,  128, 128, 128, 128, 128, 128],
    [32, 32, 32, 32, 32, 32, 32, 32, 64, 64, 64, 64,  64,  128, 128, 128, 128, 128, 128, 128],
    [32, 32, 32, 32, 32, 32, 32, 32, 64, 64, 64, 64,  64,  128, 128, 128, 128, 128, 128, 128],
    [32, 32, 32, 32, 32, 32, 32, 32, 64, 64, 64, 64,  64,  128, 128, 128, 128, 128, 128, 128],
    [16, 32, 32, 32, 32, 32, 32, 32, 32, 64, 64, 64,  128, 128, 128, 128, 128, 128, 128, 128],
    [16, 16, 16, 32, 32, 32, 32, 32, 32, 64, 64, 64,  128, 128, 128, 128, 128, 128, 1,   1  ],
    [16, 16, 16, 16, 16, 16, 32, 32, 32, 32, 64, 128, 128, 128, 128, 1,   1,   1,   1,   1  ],
    [16, 16, 16, 16, 16, 16, 16, 16, 32, 32, 64, 128, 128, 1,   1,   1,   1,   1,   1,   1  ],
    [16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 1,  1,   1,   1,   1,   1,   1,   1,   1,   1  ],
    [16, 16, 16, 16, 16, 16, 16, 16, 8,  8,  4,  2,   2,   1,   1,   1,   1,   1,   1,   1  ],
    [16, 16, 16, 16, 16, 16, 8,  8,  8,  8,  4,  2,   2,   2,   2,   1,   1,   1,   1,   1  ],
    [16, 16, 16, 8,  8,  8,  8,  8,  8,  4,  4,  4,   2,   2,   2,   2,   2,   2,   1,   1  ],
    [16, 8,  8,  8,  8,  8,  8,  8,  8,  4,  4,  4,   2,   2,   2,   2,   2,   2,   2,   2  ],
    [8,  8,  8,  8,  8,  8,  8,  8,  4,  4,  4,  4,   4,   2,   2,   2,   2,   2,   2,   2  ],
    [8,  8,  8,  8,  8,  8,  8,  8,  4,  4,  4,  4,   4,   2,   2,   2,   2,   2,   2,   2  ],
    [8,  8,  8,  8,  8,  8,  8,  8,  4,  4,  4,  4,   4,   2,   2,   2,   2,   2,   2,   2  ],
    [8,  8,  8,  8,  8,  8,  8,  4,  4,  4,  4,  4,   4,   4,   2,   2,   2,   2,   2,   2  ],
    [8,  8,  8,  8,  8,  8,  8,  4,  4,  4,  4,  4,   4,   4,   2,   2,   2,   2,   2,   2  ],
];

/// Octant code for a unit normal given its x/y tangent-slope components.
///
/// Returns one of {1, 2, 4, 8, 16, 32, 64, 128}; exactly one bit is set.
#[must_use]
pub fn quantize_normal_slopes(nx: f32, ny: f32) -> u8 {
    let max = (NORMAL_LUT_SIZE - 1) as f32;
    let col = (((nx + 1.0) * 0.5 * max).round()).clamp(0.0, max) as usize;
    let row = (((ny + 1.0) * 0.5 * max).round()).clamp(0.0, max) as usize;
    NORMAL_LUT[row][col]
}

/// Bin index 0..=7 for an octant bit code, `None` for the undefined byte
#[must_use]
pub fn octant_index(code: u8) -> Option<u8> {
    if code.count_ones() == 1 {
        Some(code.trailing_zeros() as u8)
    } else {
        None
    }
}

/// Orientation bit code for a gradient angle in degrees.
///
/// The angle is wrapped to [0°, 180°) and placed into five 36°-wide bins
/// encoded as {1, 2, 4, 8, 16}.
#[must_use]
pub fn quantize_gradient(angle_deg: f32) -> u8 {
    let wrapped = angle_deg.rem_euclid(180.0);
    let bin = ((wrapped / 36.0) as u32).min(GRADIENT_BIN_COUNT - 1);
    1u8 << bin
}
