use std::sync::Arc;

use crate::fss::{DcfEngine, FssEngine};
use crate::lut::LookupTable;
use crate::worker::WorkerPool;
use crate::{Error, Parameters, Ring};

/// Everything a role needs besides its streams: parameters, engines, the
/// worker pool and, for online evaluation, the lookup tables.
///
/// Built once at startup and passed explicitly to every role.
pub struct Context<R, F, D> {
    params: Parameters,
    fss: Arc<F>,
    dcf: Arc<D>,
    pool: WorkerPool,
    intercepts: Option<LookupTable<R>>,
    slopes: Option<LookupTable<R>>,
}

impl<R: Clone, F, D> Clone for Context<R, F, D> {
    fn clone(&self) -> Self {
        Self {
            params: self.params,
            fss: self.fss.clone(),
            dcf: self.dcf.clone(),
            pool: self.pool.clone(),
            intercepts: self.intercepts.clone(),
            slopes: self.slopes.clone(),
        }
    }
}

impl<R, F, D> Context<R, F, D>
where
    R: Ring,
    F: FssEngine<R>,
    D: DcfEngine<R>,
{
    pub fn new(params: Parameters, fss: F, dcf: D, pool: WorkerPool) -> Result<Self, Error> {
        params.check_ring::<R>()?;
        Ok(Self {
            params,
            fss: Arc::new(fss),
            dcf: Arc::new(dcf),
            pool,
            intercepts: None,
            slopes: None,
        })
    }

    /// Attach the per-segment tables. Without `slopes`, the intercept table
    /// doubles as the slope table.
    pub fn with_tables(
        mut self,
        intercepts: LookupTable<R>,
        slopes: Option<LookupTable<R>>,
    ) -> Result<Self, Error> {
        let segments = self.params.segments();
        intercepts.check_len(segments)?;
        if let Some(slopes) = &slopes {
            slopes.check_len(segments)?;
        }
        self.intercepts = Some(intercepts);
        self.slopes = slopes;
        Ok(self)
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn fss(&self) -> &Arc<F> {
        &self.fss
    }

    pub fn dcf(&self) -> &Arc<D> {
        &self.dcf
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn intercepts(&self) -> Result<&LookupTable<R>, Error> {
        self.intercepts
            .as_ref()
            .ok_or_else(|| Error::Parameters("lookup table not loaded".into()))
    }

    pub fn slopes(&self) -> Result<&LookupTable<R>, Error> {
        match &self.slopes {
            Some(slopes) => Ok(slopes),
            None => self.intercepts(),
        }
    }
}
