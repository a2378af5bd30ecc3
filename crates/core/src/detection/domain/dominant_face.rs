use crate::shared::bounding_box::BoundingBox;

/// Picks the face with the largest `width * height`.
///
/// Ties go to the box the detector returned first.
pub fn select_dominant(faces: &[BoundingBox]) -> Option<BoundingBox> {
    let mut best: Option<&BoundingBox> = None;
    for face in faces {
        if best.map_or(true, |b| face.area() > b.area()) {
            best = Some(face);
        }
    }
    best.copied()
}
