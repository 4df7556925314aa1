//! Image-source reconstruction of specular paths.

use std::f32::consts::PI;

use rayon::prelude::*;
use verb_core::{Bands, Impulse};
use verb_math::{Ray, Vec3};

use super::tree::PathTree;
use crate::voxel::VoxelisedScene;

/// Slack allowed when comparing hit distances along an unfolded path.
const PATH_EPSILON: f32 = 1e-4;

/// A specular path that survived validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePath {
    /// Final mirror image of the source
    pub image: Vec3,
    /// Reflection points ordered from the source outward
    pub points: Vec<Vec3>,
    /// Total path length
    pub distance: f32,
}

/// Mirror images of `source` across each triangle in turn.
///
/// `images[0]` is the source itself; `images[k + 1]` is `images[k]`
/// mirrored across `triangles[k]`.
pub fn mirror_images(voxels: &VoxelisedScene, source: Vec3, triangles: &[u32]) -> Vec<Vec3> {
    let scene = voxels.scene();
    let mut images = Vec::with_capacity(triangles.len() + 1);
    images.push(source);
    for &tri in triangles {
        let last = images[images.len() - 1];
        images.push(scene.triangle_verts(tri as usize).mirror(last));
    }
    images
}

/// Nothing blocks the segment from `from` to `to`, other than `exclude`.
fn unoccluded(voxels: &VoxelisedScene, from: Vec3, to: Vec3, exclude: Option<u32>) -> bool {
    let distance = from.distance(to);
    if distance <= PATH_EPSILON {
        return true;
    }
    let ray = Ray::between(from, to);
    voxels
        .intersects_excluding(&ray, exclude)
        .map_or(true, |h| h.distance >= distance - PATH_EPSILON)
}

/// Check that the specular path through `triangles` really exists.
///
/// Starting at the receiver, the line toward each successive image must
/// cross the matching triangle inside its bounds with nothing nearer in
/// the way, and the last leg to the source must be clear.
pub fn validate_path(
    voxels: &VoxelisedScene,
    source: Vec3,
    receiver: Vec3,
    triangles: &[u32],
) -> Option<ImagePath> {
    if triangles.windows(2).any(|w| w[0] == w[1]) {
        return None;
    }

    let scene = voxels.scene();
    let images = mirror_images(voxels, source, triangles);
    let image = images[images.len() - 1];
    if !image.is_finite() {
        return None;
    }

    let mut points = Vec::with_capacity(triangles.len());
    let mut from = receiver;
    let mut previous: Option<u32> = None;

    for k in (0..triangles.len()).rev() {
        let target = images[k + 1];
        let tri = triangles[k];
        let ray = Ray::between(from, target);
        if !ray.is_valid() {
            return None;
        }

        let t = scene.triangle_verts(tri as usize).intersect(&ray, 0.0)?;
        if t >= from.distance(target) + PATH_EPSILON {
            return None;
        }

        let nearest = voxels.intersects_excluding(&ray, previous)?;
        if nearest.triangle != tri && nearest.distance < t - PATH_EPSILON {
            return None;
        }

        from = ray.at(t);
        points.push(from);
        previous = Some(tri);
    }

    if !unoccluded(voxels, from, source, previous) {
        return None;
    }

    points.reverse();
    Some(ImagePath {
        image,
        points,
        distance: receiver.distance(image),
    })
}

/// Impulse for a validated path: inverse-square spreading times the
/// reflectance of every surface on the way.
fn path_impulse(
    voxels: &VoxelisedScene,
    triangles: &[u32],
    path: &ImagePath,
    speed_of_sound: f32,
) -> Impulse {
    let scene = voxels.scene();
    let reflectance = triangles.iter().fold(Bands::ONE, |acc, &tri| {
        acc * scene.surface_of(tri as usize).reflectance()
    });
    let d = path.distance.max(PATH_EPSILON);
    let volume = reflectance * (1.0 / (4.0 * PI * d * d));
    Impulse::new(volume, path.image, path.distance / speed_of_sound)
}

/// Direct source-to-receiver arrival, if the line between them is clear.
pub fn direct_impulse(
    voxels: &VoxelisedScene,
    source: Vec3,
    receiver: Vec3,
    speed_of_sound: f32,
) -> Option<Impulse> {
    if !unoccluded(voxels, receiver, source, None) {
        return None;
    }
    let path = ImagePath {
        image: source,
        points: Vec::new(),
        distance: receiver.distance(source),
    };
    Some(path_impulse(voxels, &[], &path, speed_of_sound))
}

/// Specular impulses for every visible path in `tree`.
///
/// Each valid path gives exactly one impulse; arrivals at equal times are
/// not merged here.
pub fn find_reflected(
    tree: &PathTree,
    voxels: &VoxelisedScene,
    source: Vec3,
    receiver: Vec3,
    speed_of_sound: f32,
) -> Vec<Impulse> {
    let candidates = tree.visible_paths();
    let impulses: Vec<Impulse> = candidates
        .par_iter()
        .filter_map(|tris| {
            validate_path(voxels, source, receiver, tris)
                .map(|path| path_impulse(voxels, tris, &path, speed_of_sound))
        })
        .collect();

    log::debug!(
        "Image source: {} of {} candidate paths valid",
        impulses.len(),
        candidates.len()
    );
    impulses
}

/// Direct arrival (if any) followed by all reflected arrivals.
pub fn find(
    tree: &PathTree,
    voxels: &VoxelisedScene,
    source: Vec3,
    receiver: Vec3,
    speed_of_sound: f32,
) -> Vec<Impulse> {
    direct_impulse(voxels, source, receiver, speed_of_sound)
        .into_iter()
        .chain(find_reflected(tree, voxels, source, receiver, speed_of_sound))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::tree::PathElement;
    use verb_core::{SceneData, Surface};
    use verb_math::{Aabb, Axis};

    const SPEED: f32 = 340.0;

    fn room() -> Aabb {
        Aabb::new(Vec3::ZERO, Vec3::new(4.0, 3.0, 6.0))
    }

    fn voxels(absorption: f32) -> VoxelisedScene {
        VoxelisedScene::from_scene(SceneData::from_box(&room(), Surface::uniform(absorption, 0.0)), 3)
    }

    /// Closed-form image positions of a shoebox room up to `order` reflections.
    fn analytic_images(source: Vec3, order: i32) -> Vec<Vec3> {
        let aabb = room();
        let dims = aabb.dimensions();
        let mut images = Vec::new();
        for i in -order..=order {
            for j in -order..=order {
                for k in -order..=order {
                    if i.abs() + j.abs() + k.abs() > order {
                        continue;
                    }
                    let mut p = source;
                    for (n, axis) in [(i, Axis::X), (j, Axis::Y), (k, Axis::Z)] {
                        if n.rem_euclid(2) == 1 {
                            p = aabb.mirror_inside(p, axis);
                        }
                        p[axis.index()] += n as f32 * dims[axis.index()];
                    }
                    images.push(p);
                }
            }
        }
        images
    }

    /// Every sequence of up to `depth` triangles without immediate repeats.
    fn all_sequences(triangles: u32, depth: usize) -> PathTree {
        let mut tree = PathTree::new();
        let mut stack: Vec<Vec<u32>> = (0..triangles).map(|t| vec![t]).collect();
        while let Some(seq) = stack.pop() {
            let path: Vec<PathElement> = seq
                .iter()
                .map(|&triangle| PathElement { triangle, visible: true })
                .collect();
            tree.insert(&path);
            if seq.len() < depth {
                for t in 0..triangles {
                    if Some(&t) != seq.last() {
                        let mut next = seq.clone();
                        next.push(t);
                        stack.push(next);
                    }
                }
            }
        }
        tree
    }

    #[test]
    fn test_analytic_images() {
        let images = analytic_images(Vec3::new(1.0, 2.0, 1.0), 1);
        assert_eq!(images.len(), 7);
        assert!(images.contains(&Vec3::new(-1.0, 2.0, 1.0)));
        assert!(images.contains(&Vec3::new(7.0, 2.0, 1.0)));
        assert!(images.contains(&Vec3::new(1.0, 4.0, 1.0)));
        assert!(images.contains(&Vec3::new(1.0, 2.0, 11.0)));
    }

    #[test]
    fn test_first_three_shells_match_closed_form() {
        let voxels = voxels(0.1);
        let source = Vec3::new(1.0, 2.0, 1.0);
        let receiver = Vec3::new(2.0, 1.0, 5.0);

        let tree = all_sequences(12, 3);
        let impulses = find(&tree, &voxels, source, receiver, SPEED);

        let expected: Vec<f32> = analytic_images(source, 3)
            .iter()
            .map(|image| image.distance(receiver) / SPEED)
            .collect();
        assert_eq!(expected.len(), 63);

        for t in &expected {
            assert!(
                impulses.iter().any(|i| (i.time - t).abs() < 1e-3),
                "missing arrival at {t}"
            );
        }
        for i in &impulses {
            assert!(
                expected.iter().any(|t| (i.time - t).abs() < 1e-3),
                "unexpected arrival at {}",
                i.time
            );
        }
    }

    #[test]
    fn test_direct_path() {
        let voxels = voxels(0.0);
        let source = Vec3::new(1.0, 1.0, 1.0);
        let receiver = Vec3::new(1.0, 1.0, 3.0);
        let direct = direct_impulse(&voxels, source, receiver, SPEED).unwrap();
        assert!((direct.time - 2.0 / SPEED).abs() < 1e-6);
        assert!((direct.volume[0] - 1.0 / (16.0 * PI)).abs() < 1e-6);
    }

    #[test]
    fn test_volume_includes_reflectance() {
        let voxels = voxels(0.5);
        let source = Vec3::new(1.0, 1.2, 3.0);
        let receiver = Vec3::new(1.0, 1.2, 3.0);

        // -x wall: the two triangles of face [0, 2, 6, 4] are indices 8 and 9
        let path = [8u32];
        let alt = [9u32];
        let valid = validate_path(&voxels, source, receiver, &path)
            .or_else(|| validate_path(&voxels, source, receiver, &alt))
            .unwrap();
        assert!((valid.distance - 2.0).abs() < 1e-4);
        assert!((valid.points[0] - Vec3::new(0.0, 1.2, 3.0)).length() < 1e-4);

        let impulse = path_impulse(&voxels, &path, &valid, SPEED);
        assert!((impulse.volume[2] - 0.5 / (16.0 * PI)).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_triangle_rejected() {
        let voxels = voxels(0.0);
        let p = Vec3::new(2.0, 1.5, 3.0);
        assert!(validate_path(&voxels, p, p, &[3, 3]).is_none());
    }

    #[test]
    fn test_occluded_direct_path() {
        // A single wall between source and receiver
        let scene = SceneData::new(
            vec![
                Vec3::new(-5.0, -5.0, 0.0),
                Vec3::new(5.0, -5.0, 0.0),
                Vec3::new(0.0, 5.0, 0.0),
            ],
            vec![verb_core::Triangle::new([0, 1, 2], 0)],
            vec![Surface::uniform(0.0, 0.0)],
        )
        .unwrap();
        let voxels = VoxelisedScene::from_scene(scene, 2);
        let source = Vec3::new(0.0, 0.0, 1.0);
        assert!(direct_impulse(&voxels, source, Vec3::new(0.0, 0.0, -1.0), SPEED).is_none());

        // Same side: direct and one reflection
        let receiver = Vec3::new(1.0, 0.0, 1.0);
        assert!(direct_impulse(&voxels, source, receiver, SPEED).is_some());
        let reflected = validate_path(&voxels, source, receiver, &[0]).unwrap();
        assert!((reflected.distance - 5.0f32.sqrt()).abs() < 1e-4);
    }
}
