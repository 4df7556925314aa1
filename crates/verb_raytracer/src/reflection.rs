use bytemuck::{Pod, Zeroable};
use verb_math::Vec3;

/// One ray at one bounce, as written by the tracer kernel.
///
/// `keep_going` is zero once the ray has left the scene or been terminated;
/// such a record carries no hit. `receiver_visible` is non-zero when the
/// receiver can be seen from the hit point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Reflection {
    pub position: Vec3,
    /// Outgoing direction after the bounce
    pub direction: Vec3,
    pub triangle: u32,
    pub keep_going: u32,
    pub receiver_visible: u32,
}

impl Reflection {
    pub fn hit(position: Vec3, direction: Vec3, triangle: u32, receiver_visible: bool) -> Self {
        Self {
            position,
            direction,
            triangle,
            keep_going: 1,
            receiver_visible: receiver_visible as u32,
        }
    }

    /// Record for a ray that has stopped.
    pub fn terminated() -> Self {
        Self::default()
    }

    #[inline]
    pub fn keep_going(&self) -> bool {
        self.keep_going != 0
    }

    #[inline]
    pub fn receiver_visible(&self) -> bool {
        self.receiver_visible != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!(std::mem::size_of::<Reflection>(), 36);
        let r = Reflection::hit(Vec3::ONE, Vec3::X, 4, true);
        let bytes: &[u8] = bytemuck::bytes_of(&r);
        assert_eq!(bytes.len(), 36);
        assert!(r.keep_going() && r.receiver_visible());
        assert!(!Reflection::terminated().keep_going());
    }
}
