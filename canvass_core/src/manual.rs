/*!

This is the long-form manual for `canvass_core` and the `canvass` command line tool.

## Territory listing

The reference listing is a delimited text file with one polling station per line:

```text
DEPARTAMENTO,MUNICIPIO,PUESTO,ZONA,DIRECCION
BOGOTA D.C.,BOGOTA D.C.,COLEGIO X,01,CALLE 1
"NARIÑO","PASTO","COLEGIO ""SAN JOSE"" SEDE",02,"CRA 24, # 18-50"
```

Only columns 1, 2, 3 and 5 are read (department, municipality, station, address).
The fourth column and anything after the fifth are ignored. Records with fewer than
five fields are skipped, as are records whose department is empty or repeats the
header label.

Quoting follows the usual rules: a field wrapped in `"` may contain the delimiter and
line breaks, and `""` inside it stands for one quote. Text that went through a
UTF-8 / Latin-1 mix-up (`BogotÃ¡`) is repaired on the way in.

The delimiter defaults to `,` and can be changed in the configuration
(`territorySource.delimiter`). The index keeps the values as they appear in the listing
and sorts every level so that accented letters sit next to their plain counterparts.

## Validation states

| state          | meaning                                                         |
|----------------|-----------------------------------------------------------------|
| `unverified`   | saved without asking the authority                              |
| `verified`     | the authority knows the ID and every supplied field matched     |
| `revision`     | the authority knows the ID but some supplied fields differ      |
| `inconsistent` | the authority does not know the ID, or could not be reached     |

The fields compared are `department`, `municipality`, `votingStation`, `pollingTable`
and `address`. Case and surrounding spaces are ignored, nothing else: `Bogota` and
`Bogotá` are different values. A field left blank in the claim is not compared.

Records stored with the legacy labels `sin_verificar`, `verificado` and
`inconsistente` are read back as `unverified`, `verified` and `inconsistent`.

The discrepancies of a record in `revision` are stored as a JSON array of field
names, for example `["municipality","pollingTable"]`. A missing or `null` value
reads back as an empty set.

## Bulk import

Spreadsheets (`xlsx`) and CSV files are supported. The first row holds the headers;
the following headers are recognised, with or without accents and in any case:

| column           | headers                                                       |
|------------------|---------------------------------------------------------------|
| full name        | `NOMBRES Y APELLIDOS`, `NOMBRE COMPLETO`, `NOMBRE`, `FULL NAME` |
| national ID      | `CEDULA`, `NUMERO DE CEDULA`, `DOCUMENTO`, `NATIONAL ID`        |
| age              | `EDAD`, `AGE`                                                 |
| gender           | `GENERO`, `SEXO`, `GENDER` (`M`, `F` or `Otro`)               |
| phone            | `CELULAR`, `TELEFONO`, `PHONE`                                |
| residence        | `DIRECCION`, `DIRECCION DE RESIDENCIA`, `ADDRESS`             |
| department       | `DEPARTAMENTO`, `DEPARTMENT`                                  |
| municipality     | `MUNICIPIO`, `MUNICIPALITY`                                   |
| voting station   | `LUGAR DE VOTACION`, `LUGAR VOTACION`, `VOTING STATION`       |
| polling table    | `MESA DE VOTACION`, `MESA VOTACION`, `MESA`, `POLLING TABLE`  |
| notes            | `OBSERVACIONES`, `NOTAS`, `NOTES`                             |

A row is rejected when:
 - the name or the national ID is empty, or the name is shorter than 2 characters,
 - the national ID (after removing spaces and dots) is not made of 6 to 10 digits,
 - the age is present and is not a number, or is outside 18 to 120 once its
   decimals are dropped (`17.5` is 17 and is rejected, `30.0` is 30),
 - the phone is present and is not 10 digits starting with `3`,
 - the national ID is already registered.

`NO TIENE` and `NO TIENE CELULAR` in the phone column mean the voter has no phone.
Other gender values are left empty.
A missing age is stored as 18 and a missing residence as `Por definir`. The bounds
above are the defaults of `ImportRules` and can be changed in the configuration.

Rejected rows do not stop the import. The summary lists one message per rejected row,
numbered from 1 in the order the rows were read:

```json
{"created": 4, "totalRows": 5, "errors": ["Row 3: national ID \"1234\" must have 6-10 digits"]}
```

Imported records are saved `unverified` unless `verification.verifyOnImport` is set.

## Configuration

```json
{
  "territorySource": {"filePath": "divipole.csv", "delimiter": ",", "headerLabel": "DEPARTAMENTO"},
  "authority": {"provider": "http", "url": "https://registry.example/api/lookup",
                "tokenEnv": "VERIFIK_TOKEN", "timeoutMs": 30000},
  "store": {"filePath": "records.json"},
  "verification": {"enabled": true, "verifyOnImport": false},
  "importRules": {"minAge": 18, "maxAge": 120}
}
```

Relative paths are resolved against the directory of the configuration file.

`authority.provider` is one of:
 - `http`: `GET <url>?documentNumber=<id>` with a bearer token read from the
   environment variable named by `tokenEnv`. A `200` answer is read from its `data`
   object, `404` means the ID is unknown, anything else counts as a failure.
 - `file`: a JSON object from national ID to registry record, read from `filePath`.
 - `none`: every lookup fails, so verified records end up `inconsistent`.

 */
