//! Host harness: a mixer, an optional aux expander and the bus between them
//!
//! Each side reads the other's front buffer (last sample's message) and
//! writes its back buffer; both buffers flip after the sample. Messages
//! therefore cross the bus with one sample of latency in each direction.

use mx_core::{EngineConfig, MxResult, N_AUX, StereoSample};
use std::sync::Arc;

use crate::aux_expander::{AuxExpander, AuxInput};
use crate::expansion::{AuxToMother, ExpansionInterface, MotherToAux};
use crate::mixer::{MeterBridge, Mixer, MixerHandle, MixerInputs};

/// Outputs of one console sample
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsoleFrame {
    pub master: StereoSample,
    /// Aux send outputs of the expander (silent without one)
    pub aux_sends: [StereoSample; N_AUX],
}

pub struct Console {
    mixer: Mixer,
    expander: Option<AuxExpander>,
    to_aux: ExpansionInterface<MotherToAux>,
    to_mother: ExpansionInterface<AuxToMother>,
    config: EngineConfig,
}

impl Console {
    /// Mixer without an expander
    pub fn new(config: &EngineConfig) -> MxResult<(Self, MixerHandle, Arc<MeterBridge>)> {
        let (mixer, handle, meters) = Mixer::new(config)?;
        let console = Self {
            mixer,
            expander: None,
            to_aux: ExpansionInterface::new(),
            to_mother: ExpansionInterface::new(),
            config: config.clone(),
        };
        Ok((console, handle, meters))
    }

    /// Mixer with an aux expander attached
    pub fn with_expander(config: &EngineConfig) -> MxResult<(Self, MixerHandle, Arc<MeterBridge>)> {
        let (mut console, handle, meters) = Self::new(config)?;
        console.attach_expander()?;
        Ok((console, handle, meters))
    }

    pub fn attach_expander(&mut self) -> MxResult<()> {
        if self.expander.is_none() {
            self.expander = Some(AuxExpander::new(&self.config)?);
            self.to_mother = ExpansionInterface::new();
            log::info!("Aux expander attached to mixer {}", self.mixer.id());
        }
        Ok(())
    }

    /// Detach and return the expander
    pub fn detach_expander(&mut self) -> Option<AuxExpander> {
        let expander = self.expander.take();
        if expander.is_some() {
            log::info!("Aux expander detached from mixer {}", self.mixer.id());
        }
        expander
    }

    /// Run one sample end to end, flip included
    pub fn process(&mut self, inputs: &MixerInputs, aux_inputs: &[AuxInput; N_AUX]) -> ConsoleFrame {
        let from_aux = self.expander.as_ref().map(|_| self.to_mother.read());
        let master = self.mixer.process(inputs, from_aux, Some(self.to_aux.write()));
        self.to_aux.request_flip();

        let aux_sends = match self.expander.as_mut() {
            Some(expander) => {
                let sends = expander.process(aux_inputs, self.to_aux.read(), self.to_mother.write());
                self.to_mother.request_flip();
                sends
            }
            None => [StereoSample::ZERO; N_AUX],
        };

        self.to_aux.flip();
        self.to_mother.flip();
        ConsoleFrame { master, aux_sends }
    }

    pub fn mixer(&self) -> &Mixer {
        &self.mixer
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn expander(&self) -> Option<&AuxExpander> {
        self.expander.as_ref()
    }

    pub fn expander_mut(&mut self) -> Option<&mut AuxExpander> {
        self.expander.as_mut()
    }

    /// Flips so far on the mixer → expander side
    pub fn bus_generation(&self) -> u64 {
        self.to_aux.generation()
    }
}
