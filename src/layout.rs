//! Reservation span layout: a pure projection from stay intervals to
//! drawable shapes over the date columns. Recomputed whenever the window,
//! column width, or span list changes; never mutates spans or cells.
//!
//! A span runs from the right half of its first night's cell to the left
//! half of its check-out cell — check-out does not consume the departure
//! night — so a same-day turnover renders as two adjacent shapes with no
//! shared pixels.

use crate::grid::{ColumnGeometry, GridIndex};
use crate::limits::{truncate_utf8, MAX_GUEST_NAME_LEN};
use crate::model::{ReservationId, ReservationSpan, ReservationStatus, RoomId};

/// Fixed inset for the angled leading/trailing edge; not proportional to
/// span length.
pub const EDGE_INSET_PX: f32 = 6.0;

#[derive(Debug, Clone, PartialEq)]
pub struct SpanShape {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub left_px: f32,
    pub width_px: f32,
    /// Cut the leading edge at `EDGE_INSET_PX`. Only set when the true
    /// arrival boundary is inside the window and this segment really is
    /// the arrival leg (not a room-move continuation).
    pub arrival_edge: bool,
    pub departure_edge: bool,
    pub color: &'static str,
    pub label: String,
}

pub fn status_color(status: ReservationStatus) -> &'static str {
    match status {
        ReservationStatus::Tentative => "#f0ad4e",
        ReservationStatus::Confirmed => "#5b9bd5",
        ReservationStatus::CheckedIn => "#4caf50",
        ReservationStatus::CheckedOut => "#9e9e9e",
        ReservationStatus::NoShow => "#e57373",
    }
}

/// Project one span onto the visible window; `None` when it lies entirely
/// outside.
pub fn layout_span(index: &GridIndex, geom: &ColumnGeometry, span: &ReservationSpan) -> Option<SpanShape> {
    let range = index.range();
    if span.check_out_date < range.from || span.check_in_date > range.to {
        return None;
    }

    let half = geom.cell_width_px / 2.0;
    let row_width = geom.row_width(index.days());

    // Right half of the check-in cell, clamped to column 0 when the stay
    // started before the window.
    let (left, arrival_visible) = match index.date_offset(span.check_in_date) {
        Some(col) => (geom.column_mid(col), true),
        None => (0.0, false),
    };

    // Left half of the check-out cell, clamped to the window's right edge
    // when the stay continues past it.
    let (right, departure_visible) = match index.date_offset(span.check_out_date) {
        Some(col) => (geom.column_mid(col), true),
        None => (row_width, false),
    };

    // A fully clamped single-column span still gets a visible shape.
    let mut left = left;
    let mut width = right - left;
    if width < half {
        width = half;
        if left + width > row_width {
            left = row_width - width;
        }
    }

    let mut label = span.guest_name.clone();
    truncate_utf8(&mut label, MAX_GUEST_NAME_LEN);

    Some(SpanShape {
        reservation_id: span.reservation_id,
        room_id: span.room_id,
        left_px: left,
        width_px: width,
        arrival_edge: span.is_arrival && arrival_visible,
        departure_edge: span.is_departure && departure_visible,
        color: status_color(span.status),
        label,
    })
}

/// Project a span list. Input spans are assumed non-overlapping per room
/// (the reservation subsystem's invariant); the output then contains no
/// overlapping rectangles per room.
pub fn layout_spans(index: &GridIndex, geom: &ColumnGeometry, spans: &[ReservationSpan]) -> Vec<SpanShape> {
    spans
        .iter()
        .filter_map(|s| layout_span(index, geom, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DateRange, RoomColumn};
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn column(room_id: RoomId) -> RoomColumn {
        RoomColumn {
            room_id,
            room_number: room_id.to_string(),
            category_id: 1,
            max_occupancy: 2,
            is_operational: true,
            is_out_of_order: false,
        }
    }

    fn span(id: ReservationId, check_in: &str, check_out: &str) -> ReservationSpan {
        ReservationSpan {
            reservation_id: id,
            room_id: 101,
            check_in_date: d(check_in),
            check_out_date: d(check_out),
            status: ReservationStatus::Confirmed,
            guest_name: format!("Guest {id}"),
            is_arrival: true,
            is_departure: true,
        }
    }

    fn grid(from: &str, to: &str) -> GridIndex {
        GridIndex::new(DateRange::new(d(from), d(to)), &[column(101)])
    }

    const W: f32 = 40.0;

    #[test]
    fn span_runs_half_cell_to_half_cell() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        // Check-in on col 1, check-out on col 3.
        let shape = layout_span(&idx, &geom, &span(1, "2025-09-11", "2025-09-13")).unwrap();
        assert_eq!(shape.left_px, W + W / 2.0);
        assert_eq!(shape.width_px, 2.0 * W);
        assert!(shape.arrival_edge);
        assert!(shape.departure_edge);
    }

    #[test]
    fn same_day_turnover_shapes_do_not_overlap() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let out = layout_span(&idx, &geom, &span(1, "2025-09-10", "2025-09-12")).unwrap();
        let inn = layout_span(&idx, &geom, &span(2, "2025-09-12", "2025-09-14")).unwrap();
        // Checkout ends at the midpoint of col 2; the new arrival starts there.
        assert_eq!(out.left_px + out.width_px, inn.left_px);
    }

    #[test]
    fn nonoverlapping_spans_stay_nonoverlapping() {
        let idx = grid("2025-09-10", "2025-09-20");
        let geom = ColumnGeometry::new(W);
        let spans = vec![
            span(1, "2025-09-10", "2025-09-12"),
            span(2, "2025-09-12", "2025-09-15"),
            span(3, "2025-09-16", "2025-09-18"),
        ];
        let mut shapes = layout_spans(&idx, &geom, &spans);
        shapes.sort_by(|a, b| a.left_px.total_cmp(&b.left_px));
        for w in shapes.windows(2) {
            assert!(w[0].left_px + w[0].width_px <= w[1].left_px);
        }
    }

    #[test]
    fn clamps_start_before_window() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let shape = layout_span(&idx, &geom, &span(1, "2025-09-05", "2025-09-12")).unwrap();
        assert_eq!(shape.left_px, 0.0);
        // Arrival happened before the window — no angled edge there.
        assert!(!shape.arrival_edge);
        assert!(shape.departure_edge);
    }

    #[test]
    fn clamps_end_past_window() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let shape = layout_span(&idx, &geom, &span(1, "2025-09-15", "2025-09-25")).unwrap();
        assert_eq!(shape.left_px + shape.width_px, geom.row_width(idx.days()));
        assert!(shape.arrival_edge);
        assert!(!shape.departure_edge);
    }

    #[test]
    fn fully_outside_window_is_skipped() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        assert!(layout_span(&idx, &geom, &span(1, "2025-09-01", "2025-09-05")).is_none());
        assert!(layout_span(&idx, &geom, &span(2, "2025-09-20", "2025-09-25")).is_none());
    }

    #[test]
    fn clamped_single_column_span_keeps_minimum_width() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        // Long stay whose only visible part is the departure morning on col 0.
        let shape = layout_span(&idx, &geom, &span(1, "2025-09-01", "2025-09-10")).unwrap();
        assert_eq!(shape.width_px, W / 2.0);
    }

    #[test]
    fn room_move_segment_has_no_arrival_edge() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let mut s = span(1, "2025-09-12", "2025-09-14");
        s.is_arrival = false; // second leg of a room move
        let shape = layout_span(&idx, &geom, &s).unwrap();
        assert!(!shape.arrival_edge);
        assert!(shape.departure_edge);
    }

    #[test]
    fn multibyte_guest_name_truncates_on_char_boundary() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let mut s = span(1, "2025-09-11", "2025-09-13");
        // 121 bytes with a three-byte char straddling the label bound.
        s.guest_name = format!("a{}", "あ".repeat(40));
        let shape = layout_span(&idx, &geom, &s).unwrap();
        assert!(shape.label.len() <= MAX_GUEST_NAME_LEN);
        assert_eq!(shape.label, format!("a{}", "あ".repeat(39)));
    }

    #[test]
    fn status_drives_color() {
        let idx = grid("2025-09-10", "2025-09-16");
        let geom = ColumnGeometry::new(W);
        let mut s = span(1, "2025-09-11", "2025-09-13");
        s.status = ReservationStatus::CheckedIn;
        let shape = layout_span(&idx, &geom, &s).unwrap();
        assert_eq!(shape.color, status_color(ReservationStatus::CheckedIn));
        assert_eq!(shape.label, "Guest 1");
    }
}
