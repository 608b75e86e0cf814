//! Frame transforms.
//!
//! The fusion core never computes transforms itself; it asks a
//! [`FrameTransformer`] to move the sensor origin and the beam target from the
//! sensor frame into the map's global frame.  [`TfEngine`] is the in-process
//! implementation: a directed graph of named frames related by rigid-body
//! transforms, composed along the shortest path.
//!
//! # Example
//!
//! ```rust
//! use conemap_perception::transform::{TfEngine, Transform3D, Vec3, Quaternion};
//!
//! let mut tf = TfEngine::new();
//! tf.set_transform("map", "base_link",
//!     Transform3D::new(Vec3::new(1.0, 0.0, 0.0), Quaternion::identity()));
//! tf.set_transform("base_link", "sonar_front",
//!     Transform3D::new(Vec3::new(0.2, 0.0, 0.0), Quaternion::identity()));
//!
//! let t = tf.lookup("map", "sonar_front").unwrap();
//! let p = t.apply(Vec3::new(1.0, 0.0, 0.0));
//! assert!((p.x - 2.2).abs() < 1e-9);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::debug;

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D point or translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// A unit quaternion (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// The caller is responsible for providing a unit quaternion.
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Pure rotation of `yaw` radians about +Z.
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Hamilton product.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// p' = q * p * q*
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// Pose of a child frame expressed in its parent: a point in the child frame
/// maps into the parent by rotating with `rotation`, then adding
/// `translation`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
}

impl Transform3D {
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// Planar pose: position `(x, y, z)` and heading `yaw` about +Z.
    pub fn planar(x: f64, y: f64, z: f64, yaw: f64) -> Self {
        Self::new(Vec3::new(x, y, z), Quaternion::from_yaw(yaw))
    }

    /// If `self` = T_A_B and `other` = T_B_C, the result is T_A_C.
    pub fn compose(self, other: Self) -> Self {
        let translated = self.translation.add(self.rotation.rotate(other.translation));
        let rotated = self.rotation.mul(other.rotation);
        Self::new(translated, rotated)
    }

    /// Map a point expressed in the child frame into the parent frame.
    pub fn apply(self, point: Vec3) -> Vec3 {
        self.rotation.rotate(point).add(self.translation)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// FrameTransformer
// ────────────────────────────────────────────────────────────────────────────

/// A point tagged with the frame and time it was observed in.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedPoint {
    pub frame_id: String,
    pub stamp: DateTime<Utc>,
    pub point: Vec3,
}

/// External capability that moves points between named frames.
///
/// `wait_for_transform` may block for at most `max_wait`; a `false` return is
/// a per-reading failure, never a cycle failure.
pub trait FrameTransformer {
    fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        max_wait: Duration,
    ) -> bool;

    fn transform_point(&self, target_frame: &str, point: &StampedPoint) -> Option<Vec3>;
}

// ────────────────────────────────────────────────────────────────────────────
// TfEngine
// ────────────────────────────────────────────────────────────────────────────

/// Directed graph of named frames.  `edges[parent][child]` is the pose of
/// `child` in `parent`.  Adding `A → B` does not create the inverse.
///
/// The graph holds a single static snapshot, so timestamps are ignored.
#[derive(Debug, Default, Clone)]
pub struct TfEngine {
    edges: HashMap<String, HashMap<String, Transform3D>>,
}

impl TfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the pose of `child_frame` in `parent_frame`.
    pub fn set_transform(&mut self, parent_frame: &str, child_frame: &str, transform: Transform3D) {
        self.edges
            .entry(parent_frame.to_string())
            .or_default()
            .insert(child_frame.to_string(), transform);
    }

    /// Composed pose of `child_frame` in `parent_frame`, i.e. the transform
    /// that maps points expressed in `child_frame` into `parent_frame`.
    ///
    /// BFS from the parent; `None` when no directed path exists.
    pub fn lookup(&self, parent_frame: &str, child_frame: &str) -> Option<Transform3D> {
        if parent_frame == child_frame {
            return Some(Transform3D::identity());
        }

        let mut queue: VecDeque<(String, Transform3D)> = VecDeque::new();
        let mut visited: HashSet<String> = HashSet::new();

        queue.push_back((parent_frame.to_string(), Transform3D::identity()));
        visited.insert(parent_frame.to_string());

        while let Some((current, accumulated)) = queue.pop_front() {
            if let Some(neighbours) = self.edges.get(&current) {
                for (next, edge_tf) in neighbours {
                    if visited.contains(next) {
                        continue;
                    }
                    let composed = accumulated.compose(*edge_tf);
                    if next == child_frame {
                        return Some(composed);
                    }
                    visited.insert(next.clone());
                    queue.push_back((next.clone(), composed));
                }
            }
        }

        None
    }
}

impl FrameTransformer for TfEngine {
    fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        _stamp: DateTime<Utc>,
        _max_wait: Duration,
    ) -> bool {
        self.lookup(target_frame, source_frame).is_some()
    }

    fn transform_point(&self, target_frame: &str, point: &StampedPoint) -> Option<Vec3> {
        self.lookup(target_frame, &point.frame_id)
            .map(|t| t.apply(point.point))
    }
}

/// Poll interval while waiting for a frame to be published by another thread.
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Shared engine that other threads keep publishing into.  Waiting polls until
/// the path appears or `max_wait` elapses.
impl FrameTransformer for RwLock<TfEngine> {
    fn wait_for_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: DateTime<Utc>,
        max_wait: Duration,
    ) -> bool {
        let deadline = Instant::now() + max_wait;
        loop {
            let found = match self.read() {
                Ok(tf) => tf.wait_for_transform(target_frame, source_frame, stamp, max_wait),
                Err(poisoned) => {
                    poisoned
                        .into_inner()
                        .wait_for_transform(target_frame, source_frame, stamp, max_wait)
                }
            };
            if found {
                return true;
            }
            if Instant::now() >= deadline {
                debug!(target_frame, source_frame, ?max_wait, "transform wait timed out");
                return false;
            }
            thread::sleep(WAIT_POLL.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    fn transform_point(&self, target_frame: &str, point: &StampedPoint) -> Option<Vec3> {
        match self.read() {
            Ok(tf) => tf.transform_point(target_frame, point),
            Err(poisoned) => poisoned.into_inner().transform_point(target_frame, point),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
