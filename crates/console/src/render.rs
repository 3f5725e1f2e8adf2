use std::path::Path;

use svg::{
    node::element::{path::Data, Circle, Path as SvgPath, Rectangle},
    Document,
};
use terrapen_geom::{Point, Workspace};

use crate::runner::TraceSegment;

// Multiply all dimensions by 10 because firefox doesn't like to see small svgs.
const SCALE: f32 = 10.0;

// SVG's y axis points down; the robot's points forward.
fn flip(p: Point) -> (f32, f32) {
    (p.x * SCALE, -p.y * SCALE)
}

/// Draws the travelled path: inked segments in black, pen-up travel in light blue.
pub fn illustrate(trace: &[TraceSegment], workspace: &Workspace) -> Document {
    let size = workspace.size() * SCALE;
    let (left, top) = flip(Point::new(workspace.min.x, workspace.max.y));

    let mut document = Document::new()
        .set("viewBox", (left, top, size.x, size.y))
        .add(
            Rectangle::new()
                .set("x", left)
                .set("y", top)
                .set("width", size.x)
                .set("height", size.y)
                .set("fill", "none")
                .set("stroke", "lightgray"),
        );

    for seg in trace {
        let data = Data::new().move_to(flip(seg.from)).line_to(flip(seg.to));
        let (stroke, width) = if seg.pen_down {
            ("black", 4.0)
        } else {
            ("lightblue", 1.0)
        };
        document = document.add(
            SvgPath::new()
                .set("fill", "none")
                .set("stroke", stroke)
                .set("stroke-width", width)
                .set("d", data),
        );
    }

    if let Some(last) = trace.last() {
        let (cx, cy) = flip(last.to);
        document = document.add(
            Circle::new()
                .set("cx", cx)
                .set("cy", cy)
                .set("r", 8.0)
                .set("fill", "blue"),
        );
    }
    document
}

pub fn save(path: &Path, trace: &[TraceSegment], workspace: &Workspace) -> anyhow::Result<()> {
    svg::save(path, &illustrate(trace, workspace))?;
    Ok(())
}
