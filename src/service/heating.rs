use super::{Error, Service};
use crate::access::RegisterAccess;
use crate::codec;
use crate::model::{Circuit, CurvePoint, HeatCurve, OUTDOOR_TEMPERATURES, PointsUpdate, SlopeUpdate};
use crate::registers::pnu;
use crate::validate;

impl<R: RegisterAccess> Service<R> {
    pub async fn heat_curve(&self, circuit: u8) -> Result<HeatCurve, Error> {
        let circuit = validate::circuit(circuit)?;
        self.read_heat_curve(circuit).await
    }

    /// Changes the slope and flow temperature limits of a heat curve, returning the result.
    pub async fn set_heat_curve_by_slope(
        &self,
        circuit: u8,
        update: &SlopeUpdate,
    ) -> Result<HeatCurve, Error> {
        let circuit = validate::circuit(circuit)?;
        let slope = validate::slope(update.slope)?;
        let min = validate::flow_temperature("min flow temp", update.min_flow_temp)?;
        let max = validate::flow_temperature("max flow temp", update.max_flow_temp)?;

        if let Some(slope) = slope {
            self.update(pnu::slope(circuit), codec::encode_slope(slope), "slope").await?;
        }
        self.update_flow_limits(circuit, min, max).await?;
        self.read_heat_curve(circuit).await
    }

    /// Changes the flow temperature limits and individual points of a heat curve, returning the
    /// result. A point with a flow temperature of 0 is left as it is.
    pub async fn set_heat_curve_by_points(
        &self,
        circuit: u8,
        update: &PointsUpdate,
    ) -> Result<HeatCurve, Error> {
        let circuit = validate::circuit(circuit)?;
        let min = validate::flow_temperature("min flow temp", update.min_flow_temp)?;
        let max = validate::flow_temperature("max flow temp", update.max_flow_temp)?;
        let mut points = Vec::with_capacity(update.curve_points.len());
        for point in &update.curve_points {
            let index = validate::outdoor_temperature(point.outdoor_temp)?;
            let label = format!("flow temp at {} outdoor temp", point.outdoor_temp);
            if let Some(flow) = validate::flow_temperature(&label, Some(point.flow_temp))? {
                points.push((index, flow, label));
            }
        }

        self.update_flow_limits(circuit, min, max).await?;
        let first = pnu::curve_points(circuit);
        for (index, flow, label) in points {
            self.update(first + index as u16, flow, &label).await?;
        }
        self.read_heat_curve(circuit).await
    }

    async fn update_flow_limits(
        &self,
        circuit: Circuit,
        min: Option<u16>,
        max: Option<u16>,
    ) -> Result<(), Error> {
        let limits = pnu::flow_limits(circuit);
        if let Some(min) = min {
            self.update(limits, min, "min flow temp").await?;
        }
        if let Some(max) = max {
            self.update(limits + 1, max, "max flow temp").await?;
        }
        Ok(())
    }

    async fn read_heat_curve(&self, circuit: Circuit) -> Result<HeatCurve, Error> {
        let slope = self.read(pnu::slope(circuit), 1).await?;
        let limits = self.read(pnu::flow_limits(circuit), 2).await?;
        let points = self.read(pnu::curve_points(circuit), 6).await?;
        Ok(HeatCurve {
            circuit,
            slope: codec::decode_slope(slope.word(0)),
            min_flow_temp: limits.word(0),
            max_flow_temp: limits.word(1),
            curve_points: std::array::from_fn(|i| CurvePoint {
                outdoor_temp: OUTDOOR_TEMPERATURES[i],
                flow_temp: points.word(i),
            }),
        })
    }
}
