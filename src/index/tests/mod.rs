mod tests_builder;
mod tests_iterator;
