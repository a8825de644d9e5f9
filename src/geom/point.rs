//! Integer point and extent types

use std::ops::Mul;

/// A pixel position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Width and height of a pixel region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Extent { width, height }
    }
}

impl Mul<u32> for Extent {
    type Output = Extent;

    fn mul(self, factor: u32) -> Extent {
        Extent::new(self.width * factor, self.height * factor)
    }
}
