//! Structure rendering: a row's structure encoding in, a small SVG drawing out.
//!
//! The pipeline only depends on the [`Renderer`] trait. [`StructureRenderer`] is the
//! default: it reads SMILES strings and V2000 molblocks, lays the molecule out in 2D
//! and writes a fixed-size SVG on a single line.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

use crate::dataset::Value;
use crate::error::RenderError;

pub const ARTIFACT_WIDTH: u32 = 120;
pub const ARTIFACT_HEIGHT: u32 = 100;

/// Canonical cache identity of a structure encoding: the trimmed text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderKey(String);

impl RenderKey {
    /// `None` for null or blank structure cells; those never reach the cache.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => Some(Self(crate::dataset::format_number(*n))),
            Value::Text(s) => Self::new(s),
        }
    }

    pub fn new(encoding: &str) -> Option<Self> {
        let trimmed = encoding.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RenderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable rendered payload. Cheap to clone; the empty artifact marks a row whose
/// structure could not be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Artifact(Option<Arc<str>>);

impl Artifact {
    pub fn new(payload: impl Into<Arc<str>>) -> Self {
        let payload: Arc<str> = payload.into();
        if payload.is_empty() {
            Self(None)
        } else {
            Self(Some(payload))
        }
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.as_str().len()
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Artifact {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Turns a structure encoding into an artifact. Implementations must be pure and
/// deterministic so concurrent duplicate computations are harmless.
pub trait Renderer: Send + Sync {
    fn render(&self, key: &RenderKey) -> Result<Artifact, RenderError>;
}

impl<F> Renderer for F
where
    F: Fn(&RenderKey) -> Result<Artifact, RenderError> + Send + Sync,
{
    fn render(&self, key: &RenderKey) -> Result<Artifact, RenderError> {
        self(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BondOrder {
    Single,
    Double,
    Triple,
    Aromatic,
}

#[derive(Debug, Clone, PartialEq)]
struct Atom {
    symbol: String,
    aromatic: bool,
    charge: i32,
    isotope: Option<u32>,
}

impl Atom {
    fn organic(symbol: &str, aromatic: bool) -> Self {
        Self {
            symbol: symbol.to_string(),
            aromatic,
            charge: 0,
            isotope: None,
        }
    }

    fn label(&self) -> String {
        let mut label = String::new();
        let mut chars = self.symbol.chars();
        if let Some(first) = chars.next() {
            label.extend(first.to_uppercase());
            label.push_str(chars.as_str());
        }
        match self.charge {
            0 => {}
            1 => label.push('+'),
            -1 => label.push('-'),
            c if c > 0 => {
                let _ = write!(label, "{}+", c);
            }
            c => {
                let _ = write!(label, "{}-", c.unsigned_abs());
            }
        }
        label
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bond {
    a: usize,
    b: usize,
    order: BondOrder,
}

#[derive(Debug, Default)]
struct Molecule {
    atoms: Vec<Atom>,
    bonds: Vec<Bond>,
    /// Present when the encoding carried its own 2D coordinates.
    coords: Option<Vec<Point>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct Point {
    x: f64,
    y: f64,
}

fn smiles_error(position: usize, message: impl Into<String>) -> RenderError {
    RenderError::Smiles {
        position,
        message: message.into(),
    }
}

const ORGANIC_TWO_LETTER: &[&str] = &["Cl", "Br"];
const ORGANIC: &[char] = &['B', 'C', 'N', 'O', 'P', 'S', 'F', 'I'];
const AROMATIC: &[char] = &['b', 'c', 'n', 'o', 'p', 's'];

fn parse_smiles(smiles: &str) -> Result<Molecule, RenderError> {
    let chars: Vec<char> = smiles.chars().collect();
    let mut mol = Molecule::default();
    let mut prev: Option<usize> = None;
    let mut branches: Vec<Option<usize>> = Vec::new();
    let mut rings: HashMap<u32, (usize, Option<BondOrder>, usize)> = HashMap::new();
    let mut pending: Option<(BondOrder, usize)> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let atom = match c {
            '(' => {
                if prev.is_none() {
                    return Err(smiles_error(i, "branch without a preceding atom"));
                }
                branches.push(prev);
                i += 1;
                continue;
            }
            ')' => {
                prev = branches
                    .pop()
                    .ok_or_else(|| smiles_error(i, "unmatched ')'"))?;
                i += 1;
                continue;
            }
            '-' | '/' | '\\' => {
                pending = Some((BondOrder::Single, i));
                i += 1;
                continue;
            }
            '=' => {
                pending = Some((BondOrder::Double, i));
                i += 1;
                continue;
            }
            '#' | '$' => {
                pending = Some((BondOrder::Triple, i));
                i += 1;
                continue;
            }
            ':' => {
                pending = Some((BondOrder::Aromatic, i));
                i += 1;
                continue;
            }
            '.' => {
                if pending.is_some() {
                    return Err(smiles_error(i, "bond before '.'"));
                }
                prev = None;
                i += 1;
                continue;
            }
            '0'..='9' | '%' => {
                let current = prev.ok_or_else(|| smiles_error(i, "ring bond without an atom"))?;
                let number = if c == '%' {
                    let digits: String = chars.iter().skip(i + 1).take(2).collect();
                    if digits.len() != 2 || !digits.chars().all(|d| d.is_ascii_digit()) {
                        return Err(smiles_error(i, "'%' must be followed by two digits"));
                    }
                    i += 3;
                    digits.parse::<u32>().unwrap_or_default()
                } else {
                    i += 1;
                    c.to_digit(10).unwrap_or_default()
                };
                let bond = pending.take().map(|(o, _)| o);
                match rings.remove(&number) {
                    Some((other, open_bond, _)) => {
                        if other == current {
                            return Err(smiles_error(start, "ring closes on itself"));
                        }
                        let order = bond.or(open_bond).unwrap_or_else(|| {
                            implicit_order(&mol.atoms[other], &mol.atoms[current])
                        });
                        mol.bonds.push(Bond {
                            a: other,
                            b: current,
                            order,
                        });
                    }
                    None => {
                        rings.insert(number, (current, bond, start));
                    }
                }
                continue;
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&ch| ch == ']')
                    .ok_or_else(|| smiles_error(i, "unterminated bracket atom"))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                let atom = parse_bracket_atom(&body, i)?;
                i += close + 1;
                atom
            }
            '*' => {
                i += 1;
                Atom::organic("*", false)
            }
            _ if ORGANIC.contains(&c) => {
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                if ORGANIC_TWO_LETTER.contains(&two.as_str()) {
                    i += 2;
                    Atom::organic(&two, false)
                } else {
                    i += 1;
                    Atom::organic(&c.to_string(), false)
                }
            }
            _ if AROMATIC.contains(&c) => {
                i += 1;
                Atom::organic(&c.to_string(), true)
            }
            _ => return Err(smiles_error(i, format!("unexpected character '{}'", c))),
        };

        let index = mol.atoms.len();
        if let Some(p) = prev {
            let order = match pending.take() {
                Some((order, _)) => order,
                None => implicit_order(&mol.atoms[p], &atom),
            };
            mol.bonds.push(Bond {
                a: p,
                b: index,
                order,
            });
        } else if let Some((_, pos)) = pending {
            return Err(smiles_error(pos, "bond without a preceding atom"));
        }
        mol.atoms.push(atom);
        prev = Some(index);
    }

    if let Some((_, pos)) = pending {
        return Err(smiles_error(pos, "dangling bond"));
    }
    if !branches.is_empty() {
        return Err(smiles_error(chars.len(), "unclosed branch"));
    }
    if let Some((_, _, pos)) = rings.values().min_by_key(|(_, _, pos)| *pos) {
        return Err(smiles_error(*pos, "unclosed ring"));
    }
    if mol.atoms.is_empty() {
        return Err(RenderError::Empty);
    }
    Ok(mol)
}

fn implicit_order(a: &Atom, b: &Atom) -> BondOrder {
    if a.aromatic && b.aromatic {
        BondOrder::Aromatic
    } else {
        BondOrder::Single
    }
}

/// `[13CH3+]`-style atoms: isotope, symbol, chirality, hydrogen count, charge, class.
fn parse_bracket_atom(body: &str, offset: usize) -> Result<Atom, RenderError> {
    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    let err = |i: usize, msg: &str| smiles_error(offset + 1 + i, msg);

    let digits: String = chars.iter().take_while(|c| c.is_ascii_digit()).collect();
    i += digits.len();
    let isotope = if digits.is_empty() {
        None
    } else {
        digits.parse::<u32>().ok()
    };

    let (symbol, aromatic) = match chars.get(i) {
        Some('*') => {
            i += 1;
            ("*".to_string(), false)
        }
        Some(c) if c.is_ascii_uppercase() => {
            let mut s = c.to_string();
            i += 1;
            // `H` followed by a lowercase letter would be e.g. `Hg`; plain element
            // letters never take a second uppercase.
            if let Some(&n) = chars.get(i) {
                if n.is_ascii_lowercase() {
                    s.push(n);
                    i += 1;
                }
            }
            (s, false)
        }
        Some(c) if c.is_ascii_lowercase() => {
            // aromatic `se` / `as`, otherwise a single aromatic letter
            let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
            if two == "se" || two == "as" {
                i += 2;
                (two, true)
            } else {
                i += 1;
                (c.to_string(), true)
            }
        }
        _ => return Err(err(i, "bracket atom needs an element symbol")),
    };

    while chars.get(i) == Some(&'@') {
        i += 1;
    }
    while chars.get(i).is_some_and(|c| c.is_ascii_uppercase() && *c != 'H') {
        // chirality classes like @TH1 / @SP2
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_alphanumeric() && !c.is_ascii_uppercase()) {
            i += 1;
        }
    }
    if chars.get(i) == Some(&'H') {
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }

    let mut charge = 0i32;
    while let Some(&c) = chars.get(i) {
        let sign = match c {
            '+' => 1,
            '-' => -1,
            _ => break,
        };
        i += 1;
        let digits: String = chars[i..].iter().take_while(|c| c.is_ascii_digit()).collect();
        i += digits.len();
        charge = charge.saturating_add(sign * digits.parse::<i32>().unwrap_or(1));
    }

    if chars.get(i) == Some(&':') {
        i += 1;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
    }
    if i != chars.len() {
        return Err(err(i, "unexpected content in bracket atom"));
    }

    Ok(Atom {
        symbol,
        aromatic,
        charge,
        isotope,
    })
}

/// Atom and bond counts are three-column fields.
const V2000_MAX_COUNT: usize = 999;

fn molblock_error(msg: impl Into<String>) -> RenderError {
    RenderError::Molblock(msg.into())
}

/// Fixed-width integer field, falling back to whitespace-separated parsing.
fn fixed_field(line: &str, range: std::ops::Range<usize>) -> Option<usize> {
    line.get(range)?.trim().parse::<usize>().ok()
}

/// V2000 connection table with its stored 2D coordinates.
fn parse_molblock(text: &str) -> Result<Molecule, RenderError> {
    let lines: Vec<&str> = text.lines().collect();
    let counts_at = lines
        .iter()
        .position(|l| l.contains("V2000"))
        .ok_or_else(|| molblock_error("missing V2000 counts line"))?;
    let counts = lines[counts_at];
    let (n_atoms, n_bonds) = match (fixed_field(counts, 0..3), fixed_field(counts, 3..6)) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            let mut fields = counts.split_whitespace().filter_map(|f| f.parse::<usize>().ok());
            match (fields.next(), fields.next()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(molblock_error("unreadable counts line")),
            }
        }
    };
    if n_atoms == 0 {
        return Err(RenderError::Empty);
    }
    if n_atoms > V2000_MAX_COUNT || n_bonds > V2000_MAX_COUNT {
        return Err(molblock_error(format!(
            "counts line declares {} atoms and {} bonds, V2000 allows at most {}",
            n_atoms, n_bonds, V2000_MAX_COUNT
        )));
    }
    let atoms_end = counts_at + 1 + n_atoms;
    let bonds_end = atoms_end + n_bonds;
    if lines.len() < bonds_end {
        return Err(molblock_error(format!(
            "expected {} atoms and {} bonds, block is truncated",
            n_atoms, n_bonds
        )));
    }

    let mut mol = Molecule::default();
    let mut coords = Vec::with_capacity(n_atoms);
    for (k, line) in lines[counts_at + 1..atoms_end].iter().enumerate() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let parsed = match fields.as_slice() {
            [x, y, _z, symbol, ..] => x
                .parse::<f64>()
                .ok()
                .zip(y.parse::<f64>().ok())
                .map(|(x, y)| (x, y, *symbol)),
            _ => None,
        };
        let (x, y, symbol) =
            parsed.ok_or_else(|| molblock_error(format!("bad atom line {}", k + 1)))?;
        coords.push(Point { x, y: -y });
        mol.atoms.push(Atom::organic(symbol, false));
    }
    let bond_lines = &lines[atoms_end..bonds_end];
    for (k, line) in bond_lines.iter().enumerate() {
        let fields = match (
            fixed_field(line, 0..3),
            fixed_field(line, 3..6),
            fixed_field(line, 6..9),
        ) {
            (Some(a), Some(b), Some(o)) => Some((a, b, o)),
            _ => {
                let f: Vec<usize> = line
                    .split_whitespace()
                    .take(3)
                    .filter_map(|f| f.parse().ok())
                    .collect();
                match f.as_slice() {
                    [a, b, o] => Some((*a, *b, *o)),
                    _ => None,
                }
            }
        };
        let (a, b, order) = fields.ok_or_else(|| molblock_error(format!("bad bond line {}", k + 1)))?;
        if a == 0 || b == 0 || a > n_atoms || b > n_atoms {
            return Err(molblock_error(format!("bond {} references a missing atom", k + 1)));
        }
        let order = match order {
            2 => BondOrder::Double,
            3 => BondOrder::Triple,
            4 => BondOrder::Aromatic,
            _ => BondOrder::Single,
        };
        mol.bonds.push(Bond {
            a: a - 1,
            b: b - 1,
            order,
        });
    }
    // charges from `M  CHG` property lines
    for line in &lines[bonds_end..] {
        if let Some(rest) = line.strip_prefix("M  CHG") {
            let values: Vec<i32> = rest
                .split_whitespace()
                .skip(1)
                .filter_map(|v| v.parse().ok())
                .collect();
            for pair in values.chunks(2) {
                if let [atom, charge] = pair {
                    let index = atom
                        .checked_sub(1)
                        .and_then(|i| usize::try_from(i).ok());
                    if let Some(a) = index.and_then(|i| mol.atoms.get_mut(i)) {
                        a.charge = *charge;
                    }
                }
            }
        }
    }
    mol.coords = Some(coords);
    Ok(mol)
}

fn neighbors(mol: &Molecule) -> Vec<Vec<usize>> {
    let mut adj = vec![Vec::new(); mol.atoms.len()];
    for bond in &mol.bonds {
        adj[bond.a].push(bond.b);
        adj[bond.b].push(bond.a);
    }
    adj
}

/// Deterministic 2D placement in bond-length units. Each connected fragment is
/// seeded by a depth-first zig-zag walk, relaxed with springs on bonds and 1-3
/// pairs plus short-range repulsion, then fragments are laid out left to right.
fn layout(mol: &Molecule) -> Vec<Point> {
    let n = mol.atoms.len();
    let adj = neighbors(mol);
    let mut pos = vec![Point::default(); n];
    let mut component = vec![usize::MAX; n];
    let mut fragments: Vec<Vec<usize>> = Vec::new();

    for root in 0..n {
        if component[root] != usize::MAX {
            continue;
        }
        let id = fragments.len();
        let mut members = Vec::new();
        // (atom, incoming angle, depth)
        let mut stack = vec![(root, -std::f64::consts::FRAC_PI_6, 0usize)];
        component[root] = id;
        while let Some((atom, angle, depth)) = stack.pop() {
            members.push(atom);
            let sign = if depth % 2 == 0 { 1.0 } else { -1.0 };
            let offsets = [60.0f64, -60.0, 0.0, 120.0, -120.0];
            let mut k = 0;
            for &next in &adj[atom] {
                if component[next] != usize::MAX {
                    continue;
                }
                component[next] = id;
                let a = angle + sign * offsets[k % offsets.len()].to_radians();
                k += 1;
                pos[next] = Point {
                    x: pos[atom].x + a.cos(),
                    y: pos[atom].y + a.sin(),
                };
                stack.push((next, a, depth + 1));
            }
        }
        relax(&mut pos, &members, &adj);
        fragments.push(members);
    }

    let mut cursor = 0.0;
    for members in &fragments {
        let min_x = members.iter().map(|&i| pos[i].x).fold(f64::INFINITY, f64::min);
        let max_x = members.iter().map(|&i| pos[i].x).fold(f64::NEG_INFINITY, f64::max);
        let mid_y = {
            let lo = members.iter().map(|&i| pos[i].y).fold(f64::INFINITY, f64::min);
            let hi = members.iter().map(|&i| pos[i].y).fold(f64::NEG_INFINITY, f64::max);
            (lo + hi) / 2.0
        };
        for &i in members {
            pos[i].x += cursor - min_x;
            pos[i].y -= mid_y;
        }
        cursor += (max_x - min_x) + 1.5;
    }
    pos
}

fn relax(pos: &mut [Point], members: &[usize], adj: &[Vec<usize>]) {
    if members.len() < 3 {
        return;
    }
    let ideal_13 = 3f64.sqrt();
    for step in 0..300 {
        let cooling = 1.0 - step as f64 / 300.0;
        let mut force = vec![Point::default(); members.len()];
        for (ia, &a) in members.iter().enumerate() {
            for (ib, &b) in members.iter().enumerate().skip(ia + 1) {
                let mut dx = pos[b].x - pos[a].x;
                let mut dy = pos[b].y - pos[a].y;
                let mut d = (dx * dx + dy * dy).sqrt();
                if d < 1e-6 {
                    let t = (a * 7 + b * 13) as f64;
                    dx = t.cos() * 1e-3;
                    dy = t.sin() * 1e-3;
                    d = 1e-3;
                }
                let bonded = adj[a].contains(&b);
                let one_three = !bonded && adj[a].iter().any(|m| adj[b].contains(m));
                let f = if bonded {
                    0.5 * (d - 1.0)
                } else if one_three {
                    0.2 * (d - ideal_13)
                } else if d < 2.0 {
                    -0.1 * (2.0 - d)
                } else {
                    0.0
                };
                let (fx, fy) = (f * dx / d, f * dy / d);
                force[ia].x += fx;
                force[ia].y += fy;
                force[ib].x -= fx;
                force[ib].y -= fy;
            }
        }
        for (k, &i) in members.iter().enumerate() {
            let step_limit = 0.2 * cooling + 0.01;
            pos[i].x += force[k].x.clamp(-step_limit, step_limit);
            pos[i].y += force[k].y.clamp(-step_limit, step_limit);
        }
    }
}

fn atom_color(symbol: &str) -> &'static str {
    match symbol.to_ascii_uppercase().as_str() {
        "N" => "#3050F8",
        "O" => "#E00D0D",
        "S" => "#B8A000",
        "P" => "#FF8000",
        "F" | "CL" => "#1F9F1F",
        "BR" => "#A62929",
        "I" => "#940094",
        _ => "#000000",
    }
}

fn needs_label(atom: &Atom, degree: usize) -> bool {
    !atom.symbol.eq_ignore_ascii_case("c") || atom.charge != 0 || atom.isotope.is_some() || degree == 0
}

fn draw_svg(mol: &Molecule, points: &[Point]) -> String {
    let (w, h) = (ARTIFACT_WIDTH as f64, ARTIFACT_HEIGHT as f64);
    let margin = 10.0;
    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let span_x = (max_x - min_x).max(1e-9);
    let span_y = (max_y - min_y).max(1e-9);
    let scale = ((w - 2.0 * margin) / span_x)
        .min((h - 2.0 * margin) / span_y)
        .min(25.0);
    let off_x = (w - span_x * scale) / 2.0;
    let off_y = (h - span_y * scale) / 2.0;
    let screen: Vec<Point> = points
        .iter()
        .map(|p| Point {
            x: off_x + (p.x - min_x) * scale,
            y: off_y + (p.y - min_y) * scale,
        })
        .collect();

    let adj = neighbors(mol);
    let labeled: Vec<bool> = mol
        .atoms
        .iter()
        .enumerate()
        .map(|(i, a)| needs_label(a, adj[i].len()))
        .collect();

    let mut svg = String::new();
    let _ = write!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\"><rect width=\"{w}\" height=\"{h}\" fill=\"#FFFFFF\"/>",
    );

    for bond in &mol.bonds {
        let (mut p, mut q) = (screen[bond.a], screen[bond.b]);
        let (dx, dy) = (q.x - p.x, q.y - p.y);
        let len = (dx * dx + dy * dy).sqrt();
        if len < 1e-6 {
            continue;
        }
        let (ux, uy) = (dx / len, dy / len);
        let trim = (len * 0.3).min(5.0);
        if labeled[bond.a] {
            p.x += ux * trim;
            p.y += uy * trim;
        }
        if labeled[bond.b] {
            q.x -= ux * trim;
            q.y -= uy * trim;
        }
        let (nx, ny) = (-uy, ux);
        let line = |svg: &mut String, off: f64, dashed: bool| {
            let _ = write!(
                svg,
                "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"#000000\" stroke-width=\"1.2\"{}/>",
                p.x + nx * off,
                p.y + ny * off,
                q.x + nx * off,
                q.y + ny * off,
                if dashed { " stroke-dasharray=\"2,2\"" } else { "" }
            );
        };
        match bond.order {
            BondOrder::Single => line(&mut svg, 0.0, false),
            BondOrder::Double => {
                line(&mut svg, 1.5, false);
                line(&mut svg, -1.5, false);
            }
            BondOrder::Triple => {
                line(&mut svg, 0.0, false);
                line(&mut svg, 2.5, false);
                line(&mut svg, -2.5, false);
            }
            BondOrder::Aromatic => {
                line(&mut svg, 0.0, false);
                line(&mut svg, 2.5, true);
            }
        }
    }

    for (i, atom) in mol.atoms.iter().enumerate() {
        if !labeled[i] {
            continue;
        }
        let p = screen[i];
        let _ = write!(
            svg,
            "<text x=\"{:.1}\" y=\"{:.1}\" font-family=\"sans-serif\" font-size=\"9\" text-anchor=\"middle\" dominant-baseline=\"central\" fill=\"{}\">{}</text>",
            p.x,
            p.y,
            atom_color(&atom.symbol),
            escape_xml(&atom.label())
        );
    }
    svg.push_str("</svg>");
    svg
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Default renderer for SMILES strings and V2000 molblocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructureRenderer;

impl StructureRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for StructureRenderer {
    fn render(&self, key: &RenderKey) -> Result<Artifact, RenderError> {
        let text = key.as_str();
        let mol = if text.contains('\n') || text.contains("V2000") {
            parse_molblock(text)?
        } else {
            parse_smiles(text)?
        };
        let points = match &mol.coords {
            Some(coords) => coords.clone(),
            None => layout(&mol),
        };
        Ok(Artifact::new(draw_svg(&mol, &points)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(s: &str) -> Result<Artifact, RenderError> {
        StructureRenderer::new().render(&RenderKey::new(s).unwrap())
    }

    #[test]
    fn test_render_key_trims_and_skips_blank() {
        let key = RenderKey::new("  CCO \n").unwrap();
        assert_eq!(key.as_str(), "CCO");
        assert_eq!(RenderKey::new("   "), None);
        assert_eq!(RenderKey::from_value(&Value::Null), None);
        assert_eq!(
            RenderKey::from_value(&Value::Text("CCO".to_string())),
            RenderKey::new("CCO")
        );
    }

    #[test]
    fn test_artifact_empty_sentinel() {
        assert!(Artifact::empty().is_empty());
        assert!(Artifact::new("").is_empty());
        assert_eq!(Artifact::empty().as_str(), "");
        assert!(!Artifact::new("<svg/>").is_empty());
    }

    #[test]
    fn test_parse_simple_chain() {
        let mol = parse_smiles("CCO").unwrap();
        assert_eq!(mol.atoms.len(), 3);
        assert_eq!(mol.bonds.len(), 2);
        assert_eq!(mol.atoms[2].symbol, "O");
    }

    #[test]
    fn test_parse_aromatic_ring() {
        let mol = parse_smiles("c1ccccc1").unwrap();
        assert_eq!(mol.atoms.len(), 6);
        assert_eq!(mol.bonds.len(), 6);
        assert!(mol.bonds.iter().all(|b| b.order == BondOrder::Aromatic));
    }

    #[test]
    fn test_parse_branches_and_bond_orders() {
        let mol = parse_smiles("CC(=O)OC#N").unwrap();
        assert_eq!(mol.atoms.len(), 6);
        let orders: Vec<BondOrder> = mol.bonds.iter().map(|b| b.order).collect();
        assert_eq!(
            orders,
            vec![
                BondOrder::Single,
                BondOrder::Double,
                BondOrder::Single,
                BondOrder::Single,
                BondOrder::Triple,
            ]
        );
        // the ester oxygen hangs off the carbonyl carbon, not the branch oxygen
        assert_eq!((mol.bonds[2].a, mol.bonds[2].b), (1, 3));
    }

    #[test]
    fn test_parse_two_letter_and_bracket_atoms() {
        let mol = parse_smiles("ClCBr.[NH4+].[13CH3-].[O-2]").unwrap();
        let symbols: Vec<&str> = mol.atoms.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["Cl", "C", "Br", "N", "C", "O"]);
        assert_eq!(mol.atoms[3].charge, 1);
        assert_eq!(mol.atoms[4].isotope, Some(13));
        assert_eq!(mol.atoms[4].charge, -1);
        assert_eq!(mol.atoms[5].charge, -2);
        assert_eq!(mol.bonds.len(), 2);
    }

    #[test]
    fn test_parse_chirality_and_percent_rings() {
        let mol = parse_smiles("C[C@@H](N)C%10CC%10").unwrap();
        assert_eq!(mol.atoms.len(), 6);
        assert_eq!(mol.bonds.len(), 6);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["C1CC", "C(C", "C)C", "C=", "=C", "CXC", "[C", "C..C=.C"] {
            assert!(parse_smiles(bad).is_err(), "{} should fail", bad);
        }
    }

    #[test]
    fn test_render_svg_shape() {
        let artifact = render("CC(=O)Oc1ccccc1C(=O)O").unwrap();
        let svg = artifact.as_str();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("width=\"120\""));
        assert!(svg.contains("height=\"100\""));
        assert!(svg.contains(">O</text>"));
        assert!(!svg.contains('\n'));
    }

    #[test]
    fn test_render_is_deterministic() {
        let a = render("CC(C)Cc1ccc(cc1)C(C)C(=O)O").unwrap();
        let b = render("CC(C)Cc1ccc(cc1)C(C)C(=O)O").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_render_points_stay_in_frame() {
        let mol = parse_smiles("CCCCCCCCCCCCCCCCCCCC.c1ccccc1").unwrap();
        let svg = draw_svg(&mol, &layout(&mol));
        for cap in svg.split("x1=\"").skip(1) {
            let x: f64 = cap.split('"').next().unwrap().parse().unwrap();
            assert!((0.0..=120.0).contains(&x));
        }
    }

    #[test]
    fn test_render_error_for_bad_smiles() {
        assert!(matches!(render("C1CC"), Err(RenderError::Smiles { .. })));
    }

    #[test]
    fn test_render_molblock() {
        let molblock = "ethanol\n  sdfview\n\n  3  2  0  0  0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 C   0  0\n    1.2990    0.7500    0.0000 C   0  0\n    2.5981    0.0000    0.0000 O   0  0\n  1  2  1  0\n  2  3  1  0\nM  END";
        let artifact = render(molblock).unwrap();
        assert!(artifact.as_str().contains(">O</text>"));
        assert!(matches!(
            render("junk\nno counts"),
            Err(RenderError::Molblock(_))
        ));
    }

    #[test]
    fn test_huge_bracket_charges_saturate() {
        let mol = parse_smiles("[N+2147483647+2147483647]").unwrap();
        assert_eq!(mol.atoms[0].charge, i32::MAX);
    }

    #[test]
    fn test_oversized_counts_line_is_an_error() {
        let block = "t\n  x\n\nab 18446744073709551615 18446744073709551615 V2000\nM  END";
        assert!(matches!(render(block), Err(RenderError::Molblock(_))));
    }

    #[test]
    fn test_out_of_range_charge_lines_do_not_panic() {
        let header = "t\n  x\n\n  1  0  0  0  0  0  0  0  0  0999 V2000\n    0.0000    0.0000    0.0000 N   0  0\n";

        let block = format!("{}M  CHG  1 -2147483648   1\nM  END", header);
        assert_eq!(parse_molblock(&block).unwrap().atoms[0].charge, 0);
        assert!(render(&block).is_ok());

        let block = format!("{}M  CHG  1   1 -2147483648\nM  END", header);
        assert!(render(&block).unwrap().as_str().contains("2147483648-"));
    }

    #[test]
    fn test_closure_renderer() {
        let r = |key: &RenderKey| Ok::<_, RenderError>(Artifact::new(key.as_str().to_lowercase()));
        assert_eq!(
            r.render(&RenderKey::new("CCO").unwrap()).unwrap().as_str(),
            "cco"
        );
    }
}
