/*!

This is the long-form manual for `survey_scoring` and `ikmscore`.

## Scoring

A survey is made of indicators, and each indicator groups questions. Only the
questions of type `scale` are scored: their answers are whole numbers between
1 and the configured scale maximum (5 by default, 4 or 6 are also common).
Answers outside of this range are not clamped: they are left out of every
average and reported as invalid in the output.

Only complete responses are scored. A response that did not answer a question
is simply absent from that question's numbers.

### Unweighted surveys

The score of an indicator is the total of the points given, divided by the
total of the points that could have been given:

```text
score = S / (n × p)
```

with `S` the sum of the valid answers to the indicator's questions, `n` the
number of complete responses and `p` the number of scale questions of the
indicator. The survey score applies the same formula to all the questions of
the survey at once.

Note that a missing answer lowers the score, since it still counts in the
denominator.

### Weighted surveys

The score of an indicator is the weighted average of the averages of its
questions, and the survey score is the weighted average of the indicator
scores. Weights do not need to add up to 100: the averages are always divided
by the sum of the weights. A question without any valid answer averages 0
and still counts with its full weight, and so does an indicator without data.

### IKM

The survey score is converted to the 1-4 IKM scale:

```text
ikm = ((score - 1) / (scale_max - 1)) × 3 + 1
```

A survey with no data gets an IKM of 1. The data state of the result tells
whether the number comes from actual answers.

| IKM           | Category | Label       |
|---------------|----------|-------------|
| above 3.25    | A        | Sangat Baik |
| 2.50 to 3.25  | B        | Baik        |
| above 1.75    | C        | Kurang Baik |
| 1.75 or below | D        | Tidak Baik  |

### Trends

Responses carry an optional period (year, with an optional quarter and
semester). A trend request lists periods like `2024`, `2024-S1` or `2024-Q3`;
each period is scored on its own, only with the responses of that period, and
the points are returned in the requested order.

## Input formats

### `csv`

A header row is required. The `id` column identifies the response; the
`submittedAt`, `isComplete`, `year`, `quarter` and `semester` columns are
optional. Every other column whose header is a question id holds the answers
to that question.

```text
id,submittedAt,isComplete,q1,q2,q3
r1,2024-02-01T09:12:00Z,true,4,5,3
r2,2024-02-03T14:40:00Z,true,5,,4
```

The column names can be changed in the configuration of the source.

### `xlsx`

The same layout as `csv`, in an Excel worksheet. If the workbook has more than
one worksheet, its name must be given with `excelWorksheetName`.

### `json`

An export of the response tables of the hosted database:

```text
{
  "responses": [
    {"id": "r1", "survey_id": "s1", "created_at": "2024-02-01T09:12:00Z", "is_complete": true}
  ],
  "answers": [
    {"response_id": "r1", "question_id": "q1", "score": 4}
  ]
}
```

## Configuration

`ikmscore` reads a JSON configuration:

```text
{
  "outputSettings": {"surveyName": "Pelayanan KTP", "office": "Dinas Dukcapil"},
  "survey": {"id": "s1", "title": "Pelayanan KTP", "type": "unweighted", "scaleMax": 5},
  "indicators": [
    {"id": "i1", "title": "Prosedur", "weight": 1,
     "questions": [{"id": "q1", "text": "Persyaratan mudah dipenuhi", "type": "scale"}]}
  ],
  "responseSources": [{"provider": "csv", "filePath": "responses.csv"}],
  "periods": ["2024-S1", "2024-S2"],
  "rules": {"derivePeriodFromSubmission": true}
}
```

Paths of the sources are relative to the configuration file.

 */
