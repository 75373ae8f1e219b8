//! How a query's free parameters expand into planner reward rows.

use ndarray::{Array2, ArrayView1, ArrayView2, Axis, concatenate};

use crate::{
    Error, Result,
    config::Objective,
    mdp::Mdp,
    optim::BatchObjective,
    planner::Planner,
    posterior::{Hypotheses, PosteriorEngine},
};

/// The non-free part of a query handed to [`crate::model::Model::compute`].
#[derive(Debug, Clone, Copy)]
pub enum QueryLayout<'a> {
    /// Complete reward vectors, one per row. Free rows (if any) follow them.
    Rewards(ArrayView2<'a, f64>),
    /// Queried feature indices. Each alternative assigns one grid value to
    /// every queried feature; unqueried features share the free weights.
    Features {
        indices: &'a [usize],
        grid: &'a [f64],
    },
}

impl<'a> QueryLayout<'a> {
    /// The same layout borrowed for a shorter lifetime.
    pub fn reborrow<'b>(self) -> QueryLayout<'b>
    where
        'a: 'b,
    {
        match self {
            QueryLayout::Rewards(rows) => QueryLayout::Rewards(rows.reborrow()),
            QueryLayout::Features { indices, grid } => QueryLayout::Features { indices, grid },
        }
    }

    pub(crate) fn validate(&self, feature_dim: usize) -> Result<()> {
        match self {
            QueryLayout::Rewards(rows) => {
                if rows.ncols() != feature_dim && rows.nrows() > 0 {
                    return Err(Error::DimensionMismatch {
                        context: "query reward width".to_string(),
                        expected: feature_dim,
                        got: rows.ncols(),
                    });
                }
            }
            QueryLayout::Features { indices, grid } => {
                if grid.is_empty() {
                    return Err(Error::InvalidQuery {
                        message: "feature query needs at least one grid value".to_string(),
                    });
                }
                for (pos, &idx) in indices.iter().enumerate() {
                    if idx >= feature_dim {
                        return Err(Error::InvalidQuery {
                            message: format!("feature {idx} out of range for dimension {feature_dim}"),
                        });
                    }
                    if indices[..pos].contains(&idx) {
                        return Err(Error::InvalidQuery {
                            message: format!("feature {idx} is queried twice"),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Shape of the free-parameter matrix for `num_unknown` free rows.
    pub(crate) fn free_shape(&self, feature_dim: usize, num_unknown: usize) -> (usize, usize) {
        match self {
            QueryLayout::Rewards(_) => (num_unknown, feature_dim),
            QueryLayout::Features { indices, .. } => (1, feature_dim - indices.len()),
        }
    }
}

/// Indices of `0..feature_dim` not in `queried`, ascending.
pub fn unqueried_features(feature_dim: usize, queried: &[usize]) -> Vec<usize> {
    (0..feature_dim).filter(|i| !queried.contains(i)).collect()
}

/// Reward rows of a feature query: the cartesian product of `grid` over the
/// queried features, with `weights` filling the unqueried ones in ascending
/// feature order.
///
/// # Examples
///
/// ```
/// use ird_query::model::feature_query_rewards;
/// use ndarray::array;
///
/// let rows = feature_query_rewards(3, &[2], &[-1.0, 1.0], array![0.5, 0.25].view())?;
/// assert_eq!(rows, array![[0.5, 0.25, -1.0], [0.5, 0.25, 1.0]]);
/// # Ok::<(), ird_query::Error>(())
/// ```
///
/// # Errors
///
/// [`Error::InvalidQuery`] when the number of alternatives overflows `usize`.
pub fn feature_query_rewards(
    feature_dim: usize,
    indices: &[usize],
    grid: &[f64],
    weights: ArrayView1<'_, f64>,
) -> Result<Array2<f64>> {
    let num_rows = u32::try_from(indices.len())
        .ok()
        .and_then(|exp| grid.len().checked_pow(exp))
        .ok_or_else(|| Error::InvalidQuery {
            message: format!(
                "{} grid values over {} queried features is too many alternatives",
                grid.len(),
                indices.len()
            ),
        })?;
    let free = unqueried_features(feature_dim, indices);
    let mut rows = Array2::zeros((num_rows, feature_dim));
    for (row_idx, mut row) in rows.axis_iter_mut(Axis(0)).enumerate() {
        for (&feature, &w) in free.iter().zip(weights.iter()) {
            row[feature] = w;
        }
        // Odometer over the grid; the last queried feature varies fastest.
        let mut rest = row_idx;
        for &feature in indices.iter().rev() {
            row[feature] = grid[rest % grid.len()];
            rest /= grid.len();
        }
    }
    Ok(rows)
}

/// Objective of a query as a function of its free parameters, planned in batch.
pub(crate) struct PlannedObjective<'a> {
    pub planner: &'a dyn Planner,
    pub mdp: &'a Mdp,
    pub layout: QueryLayout<'a>,
    /// Feature expectations of the fixed reward rows; unused for feature queries.
    pub fixed_fe: Array2<f64>,
    pub engine: PosteriorEngine,
    pub objective: Objective,
    pub hypotheses: Option<Hypotheses<'a>>,
}

impl PlannedObjective<'_> {
    /// Feature expectations of the whole query for each candidate parameter matrix.
    pub fn feature_exps_batch(&self, params: &[Array2<f64>]) -> Result<Vec<Array2<f64>>> {
        if params.is_empty() {
            return Ok(Vec::new());
        }
        let dim = self.mdp.feature_dim();
        let blocks: Vec<Array2<f64>> = match self.layout {
            QueryLayout::Rewards(_) => params.to_vec(),
            QueryLayout::Features { indices, grid } => params
                .iter()
                .map(|p| feature_query_rewards(dim, indices, grid, p.row(0)))
                .collect::<Result<_>>()?,
        };
        let rows_per_block = blocks.first().map_or(0, |b| b.nrows());
        let views: Vec<ArrayView2<'_, f64>> = blocks.iter().map(|b| b.view()).collect();
        let stacked = concatenate(Axis(0), &views)?;
        let planned = if stacked.nrows() == 0 {
            Array2::zeros((0, dim))
        } else {
            self.planner.feature_expectations(self.mdp, stacked.view())?
        };

        let mut out = Vec::with_capacity(params.len());
        for block in 0..params.len() {
            let start = block * rows_per_block;
            let chunk = planned.slice(ndarray::s![start..start + rows_per_block, ..]);
            out.push(match self.layout {
                QueryLayout::Rewards(_) => concatenate(Axis(0), &[self.fixed_fe.view(), chunk])?,
                QueryLayout::Features { .. } => chunk.to_owned(),
            });
        }
        Ok(out)
    }
}

impl BatchObjective for PlannedObjective<'_> {
    fn value_batch(&self, params: &[Array2<f64>]) -> Result<Vec<f64>> {
        let hypotheses = self.hypotheses.ok_or_else(|| Error::MissingInput {
            input: "true_reward_matrix".to_string(),
        })?;
        self.feature_exps_batch(params)?
            .iter()
            .map(|fe| self.engine.objective(self.objective, fe.view(), hypotheses))
            .collect()
    }
}
