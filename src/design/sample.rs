//! Sample design lifecycle.
//!
//! A design is rebuilt from scratch on every request and fully replaces the
//! previous instance. Readiness is a small state machine published through a
//! watch channel, so consumers await transitions instead of polling a flag.

use crate::backend::{Backend, GridExpr, PointsExpr};
use crate::design::Designer;
use crate::models::{Result, SbaeError};
use std::sync::RwLock;
use tokio::sync::watch;
use tracing::info;

/// A built sampling design: the grid, the point expression over it, and the
/// materialized total count.
///
/// Invariant: `total_points` == cell count for systematic sampling, and
/// cell count × n_points for random sampling.
#[derive(Debug, Clone)]
pub struct SampleDesign {
    pub grid: GridExpr,
    pub points: PointsExpr,
    pub total_points: u64,
}

/// Design readiness states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignState {
    /// No design exists
    Empty,
    /// A rebuild is in flight
    Building,
    /// The current design is complete and consumable
    Ready,
}

/// Owns the current design and its readiness signal.
pub struct DesignSession {
    designer: Designer,
    state_tx: watch::Sender<DesignState>,
    current: RwLock<Option<SampleDesign>>,
}

impl DesignSession {
    pub fn new(designer: Designer) -> Self {
        let (state_tx, _) = watch::channel(DesignState::Empty);
        Self {
            designer,
            state_tx,
            current: RwLock::new(None),
        }
    }

    pub fn designer(&self) -> &Designer {
        &self.designer
    }

    /// Subscribe to readiness transitions.
    pub fn subscribe(&self) -> watch::Receiver<DesignState> {
        self.state_tx.subscribe()
    }

    /// Current readiness state.
    pub fn state(&self) -> DesignState {
        *self.state_tx.borrow()
    }

    /// The current design, if one is ready.
    pub fn design(&self) -> Option<SampleDesign> {
        self.current.read().expect("design lock poisoned").clone()
    }

    /// Build a fresh design at the given grid size, replacing any previous
    /// one. On failure the session returns to `Empty` and the error
    /// propagates to the caller.
    pub async fn rebuild(&self, grid_size: u32) -> Result<SampleDesign> {
        self.state_tx.send_replace(DesignState::Building);
        *self.current.write().expect("design lock poisoned") = None;

        match self.build_inner(grid_size).await {
            Ok(design) => {
                *self.current.write().expect("design lock poisoned") = Some(design.clone());
                self.state_tx.send_replace(DesignState::Ready);
                Ok(design)
            }
            Err(e) => {
                self.state_tx.send_replace(DesignState::Empty);
                Err(e)
            }
        }
    }

    async fn build_inner(&self, grid_size: u32) -> Result<SampleDesign> {
        let grid = self.designer.build_grid(grid_size)?;
        let points = self.designer.build_points(&grid)?;

        // The count evaluation is the only suspension point of a rebuild
        let total_points = self.designer.backend().count_features(&points).await?;

        info!(
            aoi = self.designer.aoi().name(),
            grid_size = grid_size,
            total_points = total_points,
            "Sample design ready"
        );

        Ok(SampleDesign {
            grid,
            points,
            total_points,
        })
    }

    /// Wait until a subscribed receiver observes `Ready`.
    pub async fn wait_ready(rx: &mut watch::Receiver<DesignState>) -> Result<()> {
        rx.wait_for(|state| *state == DesignState::Ready)
            .await
            .map_err(|_| SbaeError::ChannelClosed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::models::{Aoi, DesignConfig};
    use geo::{polygon, MultiPolygon};
    use std::sync::Arc;

    fn session(method: &str, n_points: u32) -> DesignSession {
        let poly = polygon![
            (x: 0.0, y: 0.0),
            (x: 400.0, y: 0.0),
            (x: 400.0, y: 400.0),
            (x: 0.0, y: 400.0),
        ];
        let aoi = Aoi::new("block", MultiPolygon(vec![poly])).unwrap();
        let params = DesignConfig {
            shape: Some("square".to_string()),
            method: Some(method.to_string()),
            grid_size: 100,
            n_points,
            seed: 42,
            crs: "EPSG:3857".to_string(),
        };
        DesignSession::new(Designer::new(Arc::new(MemoryBackend::new()), aoi, params))
    }

    #[tokio::test]
    async fn systematic_design_count_equals_cells() {
        let session = session("systematic", 1);
        let design = session.rebuild(100).await.unwrap();
        // 400 x 400 AOI at 100 m cells: 16 cells, one centroid each
        assert_eq!(design.total_points, 16);
        assert_eq!(session.state(), DesignState::Ready);
    }

    #[tokio::test]
    async fn random_design_count_is_cells_times_n() {
        let session = session("random", 3);
        let design = session.rebuild(100).await.unwrap();
        assert_eq!(design.total_points, 48);
    }

    #[tokio::test]
    async fn rebuild_replaces_previous_design() {
        let session = session("systematic", 1);
        session.rebuild(100).await.unwrap();
        let coarse = session.rebuild(200).await.unwrap();
        // 400 x 400 at 200 m cells: 4 cells
        assert_eq!(coarse.total_points, 4);
        assert_eq!(session.design().unwrap().total_points, 4);
    }

    #[tokio::test]
    async fn failed_rebuild_returns_to_empty() {
        let session = session("cluster", 1);
        assert!(session.rebuild(100).await.is_err());
        assert_eq!(session.state(), DesignState::Empty);
        assert!(session.design().is_none());
    }

    #[tokio::test]
    async fn subscribers_observe_readiness() {
        let session = session("systematic", 1);
        let mut rx = session.subscribe();
        assert_eq!(*rx.borrow(), DesignState::Empty);

        session.rebuild(100).await.unwrap();
        DesignSession::wait_ready(&mut rx).await.unwrap();
        assert_eq!(*rx.borrow(), DesignState::Ready);
    }
}
