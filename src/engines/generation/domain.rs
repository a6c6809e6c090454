use crate::error::{Result, TunerError};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single parameter value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Allele {
    Integer(i64),
    Float(f64),
    Text(String),
    Bool(bool),
}

impl Allele {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Allele::Integer(v) => Some(*v as f64),
            Allele::Float(v) => Some(*v),
            Allele::Bool(_) | Allele::Text(_) => None,
        }
    }

    fn variant_index(&self) -> u8 {
        match self {
            Allele::Integer(_) => 0,
            Allele::Float(_) => 1,
            Allele::Text(_) => 2,
            Allele::Bool(_) => 3,
        }
    }
}

// Floats compare by total order so alleles (and genomes) can be map keys.
impl PartialEq for Allele {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Allele {}

impl Ord for Allele {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Allele::Integer(a), Allele::Integer(b)) => a.cmp(b),
            (Allele::Float(a), Allele::Float(b)) => a.total_cmp(b),
            (Allele::Text(a), Allele::Text(b)) => a.cmp(b),
            (Allele::Bool(a), Allele::Bool(b)) => a.cmp(b),
            _ => self.variant_index().cmp(&other.variant_index()),
        }
    }
}

impl PartialOrd for Allele {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Allele {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_index().hash(state);
        match self {
            Allele::Integer(v) => v.hash(state),
            Allele::Float(v) => v.to_bits().hash(state),
            Allele::Text(v) => v.hash(state),
            Allele::Bool(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Allele {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Allele::Integer(v) => write!(f, "{}", v),
            Allele::Float(v) => write!(f, "{}", v),
            Allele::Text(v) => write!(f, "{}", v),
            Allele::Bool(v) => write!(f, "{}", v),
        }
    }
}

/// Value range of a parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    Continuous { min: f64, max: f64, log_scale: bool },
    Integer { min: i64, max: i64, log_scale: bool },
    Categorical { values: Vec<Allele> },
}

impl Domain {
    pub fn continuous(min: f64, max: f64) -> Result<Self> {
        Self::checked_continuous(min, max, false)
    }

    pub fn log_continuous(min: f64, max: f64) -> Result<Self> {
        Self::checked_continuous(min, max, true)
    }

    pub fn integer(min: i64, max: i64) -> Result<Self> {
        Self::checked_integer(min, max, false)
    }

    pub fn log_integer(min: i64, max: i64) -> Result<Self> {
        Self::checked_integer(min, max, true)
    }

    pub fn categorical(values: Vec<Allele>) -> Result<Self> {
        if values.is_empty() {
            return Err(TunerError::InvalidArgument(
                "Categorical domain needs at least one value".to_string(),
            ));
        }
        Ok(Domain::Categorical { values })
    }

    fn checked_continuous(min: f64, max: f64, log_scale: bool) -> Result<Self> {
        if !(min.is_finite() && max.is_finite()) || min > max {
            return Err(TunerError::InvalidArgument(format!(
                "Invalid continuous domain [{}, {}]",
                min, max
            )));
        }
        if log_scale && min <= 0.0 {
            return Err(TunerError::InvalidArgument(format!(
                "Log-scaled domain must be positive, got minimum {}",
                min
            )));
        }
        Ok(Domain::Continuous { min, max, log_scale })
    }

    fn checked_integer(min: i64, max: i64, log_scale: bool) -> Result<Self> {
        if min > max {
            return Err(TunerError::InvalidArgument(format!(
                "Invalid integer domain [{}, {}]",
                min, max
            )));
        }
        if log_scale && min <= 0 {
            return Err(TunerError::InvalidArgument(format!(
                "Log-scaled domain must be positive, got minimum {}",
                min
            )));
        }
        Ok(Domain::Integer { min, max, log_scale })
    }

    /// Number of distinct values, `None` for continuous domains
    pub fn size(&self) -> Option<usize> {
        match self {
            Domain::Continuous { .. } => None,
            Domain::Integer { min, max, .. } => {
                let span = *max as i128 - *min as i128 + 1;
                Some(usize::try_from(span).unwrap_or(usize::MAX))
            }
            Domain::Categorical { values } => Some(values.len()),
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self, Domain::Categorical { .. })
    }

    pub fn contains(&self, allele: &Allele) -> bool {
        match (self, allele) {
            (Domain::Continuous { min, max, .. }, Allele::Float(v)) => *v >= *min && *v <= *max,
            (Domain::Integer { min, max, .. }, Allele::Integer(v)) => *v >= *min && *v <= *max,
            (Domain::Categorical { values }, a) => values.contains(a),
            _ => false,
        }
    }

    pub fn generate_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Allele {
        match self {
            Domain::Continuous { .. } | Domain::Integer { .. } => self.from_unit(rng.gen::<f64>()),
            Domain::Categorical { values } => values[rng.gen_range(0..values.len())].clone(),
        }
    }

    /// Gaussian mutation for numerical domains, uniform re-draw of a different
    /// value for categorical ones.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        allele: &Allele,
        variance_percentage: f64,
        rng: &mut R,
    ) -> Allele {
        match self {
            Domain::Continuous { .. } | Domain::Integer { .. } => {
                let current = match self.to_unit(allele) {
                    Ok(t) => t,
                    Err(_) => return self.generate_random(rng),
                };
                let deviation = variance_percentage.max(f64::EPSILON);
                let shifted = match Normal::new(current, deviation) {
                    Ok(normal) => normal.sample(rng),
                    Err(_) => current,
                };
                self.from_unit(shifted.clamp(0.0, 1.0))
            }
            Domain::Categorical { values } => {
                if values.len() <= 1 {
                    return values[0].clone();
                }
                let others: Vec<&Allele> = values.iter().filter(|v| *v != allele).collect();
                if others.is_empty() {
                    return allele.clone();
                }
                others[rng.gen_range(0..others.len())].clone()
            }
        }
    }

    /// Position of `allele` inside the domain, scaled to [0, 1]
    pub fn to_unit(&self, allele: &Allele) -> Result<f64> {
        if !self.contains(allele) {
            return Err(TunerError::InvalidArgument(format!(
                "Allele {} is not part of domain {:?}",
                allele, self
            )));
        }
        let t = match (self, allele) {
            (Domain::Continuous { min, max, log_scale }, Allele::Float(v)) => {
                unit_position(*v, *min, *max, *log_scale)
            }
            (Domain::Integer { min, max, log_scale }, Allele::Integer(v)) => {
                unit_position(*v as f64, *min as f64, *max as f64, *log_scale)
            }
            (Domain::Categorical { values }, a) => {
                let index = values.iter().position(|v| v == a).unwrap_or(0);
                if values.len() <= 1 {
                    0.0
                } else {
                    index as f64 / (values.len() - 1) as f64
                }
            }
            _ => 0.0,
        };
        Ok(t)
    }

    /// Inverse of [`Domain::to_unit`]. Integer and categorical values are
    /// rounded and clamped into the domain.
    pub fn from_unit(&self, t: f64) -> Allele {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        match self {
            Domain::Continuous { min, max, log_scale } => {
                Allele::Float(unit_value(t, *min, *max, *log_scale).clamp(*min, *max))
            }
            Domain::Integer { min, max, log_scale } => {
                let value = unit_value(t, *min as f64, *max as f64, *log_scale).round() as i64;
                Allele::Integer(value.clamp(*min, *max))
            }
            Domain::Categorical { values } => {
                let index = (t * (values.len() - 1) as f64).round() as usize;
                values[index.min(values.len() - 1)].clone()
            }
        }
    }
}

fn unit_position(value: f64, min: f64, max: f64, log_scale: bool) -> f64 {
    let (value, min, max) = if log_scale {
        (value.ln(), min.ln(), max.ln())
    } else {
        (value, min, max)
    };
    if max - min <= 0.0 {
        0.0
    } else {
        ((value - min) / (max - min)).clamp(0.0, 1.0)
    }
}

fn unit_value(t: f64, min: f64, max: f64, log_scale: bool) -> f64 {
    if log_scale {
        (min.ln() + t * (max.ln() - min.ln())).exp()
    } else {
        min + t * (max - min)
    }
}
