use anyhow::bail;

/// Name-keyed set of interchangeable collaborator backends.
#[derive(Debug, Clone)]
pub struct ProviderRegistry<T: NamedProvider> {
    providers: Vec<T>,
}

pub trait NamedProvider {
    fn name(&self) -> &str;
}

impl<T: NamedProvider> Default for ProviderRegistry<T> {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
        }
    }
}

impl<T: NamedProvider> ProviderRegistry<T> {
    pub fn new(providers: Vec<T>) -> Self {
        Self { providers }
    }

    /// Adds `provider`, replacing any earlier entry with the same name.
    pub fn register(&mut self, provider: T) {
        self.providers
            .retain(|existing| existing.name() != provider.name());
        self.providers.push(provider);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.providers
            .iter()
            .find(|provider| provider.name() == name)
    }

    pub fn list(&self) -> Vec<String> {
        let mut names = self
            .providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect::<Vec<String>>();
        names.sort();
        names
    }

    pub fn providers(&self) -> &[T] {
        self.providers.as_slice()
    }

    /// Consumes the registry and hands back the provider called `name`.
    pub fn select(mut self, name: &str, capability: &str) -> anyhow::Result<T> {
        let wanted = name.trim();
        let Some(idx) = self
            .providers
            .iter()
            .position(|provider| provider.name() == wanted)
        else {
            bail!(
                "Unknown {capability} provider '{wanted}' (available: {}).",
                self.list().join(", ")
            );
        };
        Ok(self.providers.swap_remove(idx))
    }
}
