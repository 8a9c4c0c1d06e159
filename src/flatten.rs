//! Expands string-encoded coordinate cells into per-point records.
//!
//! A cell holds a nested list of coordinate pairs, e.g.
//! `[[(104.75, -2.97), (104.76, -2.96)]]`. Pairs may be written as tuples or
//! brackets and any number of outer list levels is unwrapped.

use std::iter::Peekable;
use std::str::CharIndices;

use geo::Coord;
use hashbrown::HashMap;

use crate::error::{GapError, Result};
use crate::models::{PointRecord, RoadRow};

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    List(Vec<Node>),
}

struct CellParser<'a> {
    src: &'a str,
    chars: Peekable<CharIndices<'a>>,
    road_id: &'a str,
}

impl<'a> CellParser<'a> {
    fn new(road_id: &'a str, src: &'a str) -> Self {
        Self {
            src,
            chars: src.char_indices().peekable(),
            road_id,
        }
    }

    fn error(&self, message: impl Into<String>) -> GapError {
        GapError::parse(self.road_id, message)
    }

    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}
    }

    fn parse(mut self) -> Result<Node> {
        self.skip_whitespace();
        if self.chars.peek().is_none() {
            return Err(self.error("empty coordinate cell"));
        }
        let node = self.value()?;
        self.skip_whitespace();
        if let Some((pos, c)) = self.chars.next() {
            return Err(self.error(format!("unexpected '{}' at offset {}", c, pos)));
        }
        Ok(node)
    }

    fn value(&mut self) -> Result<Node> {
        self.skip_whitespace();
        match self.chars.peek().copied() {
            Some((_, open @ ('[' | '('))) => {
                self.chars.next();
                let close = if open == '[' { ']' } else { ')' };
                self.list(close)
            }
            Some(_) => self.number(),
            None => Err(self.error("unexpected end of cell")),
        }
    }

    fn list(&mut self, close: char) -> Result<Node> {
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.chars.next_if(|&(_, c)| c == close).is_some() {
            return Ok(Node::List(items));
        }

        loop {
            items.push(self.value()?);
            self.skip_whitespace();
            match self.chars.next() {
                Some((_, ',')) => {
                    self.skip_whitespace();
                    // Trailing comma, as in the one-element tuple `((1, 2),)`
                    if self.chars.next_if(|&(_, c)| c == close).is_some() {
                        return Ok(Node::List(items));
                    }
                }
                Some((_, c)) if c == close => return Ok(Node::List(items)),
                Some((pos, c)) => {
                    return Err(self.error(format!(
                        "expected ',' or '{}' at offset {}, found '{}'",
                        close, pos, c
                    )))
                }
                None => return Err(self.error(format!("missing closing '{}'", close))),
            }
        }
    }

    fn number(&mut self) -> Result<Node> {
        let start = match self.chars.peek() {
            Some((pos, _)) => *pos,
            None => return Err(self.error("expected a number")),
        };
        let mut end = start;
        while let Some((pos, c)) = self
            .chars
            .next_if(|&(_, c)| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            end = pos + c.len_utf8();
        }

        let token = &self.src[start..end];
        if token.is_empty() {
            let found = self.src[start..].chars().next().unwrap_or(' ');
            return Err(self.error(format!("unexpected '{}' at offset {}", found, start)));
        }

        token
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Node::Number)
            .ok_or_else(|| self.error(format!("'{}' is not a finite number", token)))
    }
}

fn collect_pairs(road_id: &str, node: &Node, out: &mut Vec<Coord<f64>>) -> Result<()> {
    let items = match node {
        Node::List(items) => items,
        Node::Number(_) => {
            return Err(GapError::parse(road_id, "bare number outside a coordinate pair"))
        }
    };

    let numbers = items.iter().filter(|n| matches!(n, Node::Number(_))).count();
    match (numbers, items.len()) {
        (0, _) => items
            .iter()
            .try_for_each(|child| collect_pairs(road_id, child, out)),
        (2, 2) => {
            if let [Node::Number(x), Node::Number(y)] = items.as_slice() {
                out.push(Coord { x: *x, y: *y });
            }
            Ok(())
        }
        (n, len) if n == len => Err(GapError::parse(
            road_id,
            format!("coordinate pair has {} values, expected 2", n),
        )),
        _ => Err(GapError::parse(road_id, "list mixes numbers and nested lists")),
    }
}

/// A row whose coordinate cell parsed successfully.
///
/// Points are re-derived on every call to [`FlatRow::points`], so the sequence
/// can be walked any number of times with identical results.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow<'a> {
    pub source: &'a RoadRow,
    /// Sequence index of the first point in this row
    pub first_index: usize,
    pub coords: Vec<Coord<f64>>,
}

impl<'a> FlatRow<'a> {
    pub fn points(&self) -> impl Iterator<Item = PointRecord<'a>> + '_ {
        let road_id = self.source.road_id.as_str();
        self.coords
            .iter()
            .enumerate()
            .map(move |(i, c)| PointRecord {
                road_id,
                sequence_index: self.first_index + i,
                x: c.x,
                y: c.y,
            })
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

pub struct CoordinateFlattener;

impl CoordinateFlattener {
    /// Parse one coordinate cell into its pairs, in written order
    pub fn parse_cell(road_id: &str, cell: &str) -> Result<Vec<Coord<f64>>> {
        let node = CellParser::new(road_id, cell).parse()?;
        let mut coords = Vec::new();
        collect_pairs(road_id, &node, &mut coords)?;
        Ok(coords)
    }

    /// Flatten a single row, numbering its points from zero
    pub fn flatten_row(row: &RoadRow) -> Result<FlatRow<'_>> {
        let coords = Self::parse_cell(&row.road_id, &row.coordinates)?;
        Ok(FlatRow {
            source: row,
            first_index: 0,
            coords,
        })
    }

    /// Flatten rows in order.
    ///
    /// Rows sharing a road id continue that road's sequence numbering, so a
    /// road split across rows keeps row order followed by in-cell order. A row
    /// that fails to parse yields its error and does not consume indices.
    pub fn flatten(rows: &[RoadRow]) -> impl Iterator<Item = Result<FlatRow<'_>>> + '_ {
        let mut next_index: HashMap<&str, usize> = HashMap::new();
        rows.iter().map(move |row| {
            let coords = Self::parse_cell(&row.road_id, &row.coordinates)?;
            let counter = next_index.entry(row.road_id.as_str()).or_insert(0);
            let first_index = *counter;
            *counter += coords.len();
            Ok(FlatRow {
                source: row,
                first_index,
                coords,
            })
        })
    }
}
